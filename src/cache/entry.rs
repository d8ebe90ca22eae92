use std::sync::Arc;

use crate::foundation::core::{FrameIndex, OutputFormat};

/// Mutable access metadata attached to a cache entry.
///
/// Everything except `hit_count` and `last_access_ms` is fixed at store time.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EntryMetadata {
    /// Rendered width in pixels.
    pub width: u32,
    /// Rendered height in pixels.
    pub height: u32,
    /// Output format the bytes are encoded in.
    pub format: OutputFormat,
    /// Encoder quality the frame was rendered at.
    pub quality: u8,
    /// Wall-clock time the original render took, in milliseconds.
    pub render_time_ms: f64,
    /// Number of successful lookups served by this entry.
    pub hit_count: u64,
    /// Unix-millisecond timestamp of the most recent successful lookup.
    pub last_access_ms: u64,
}

/// A single cached rendered frame.
///
/// `data` is immutable once stored; only `metadata.hit_count` and
/// `metadata.last_access_ms` mutate, on every successful lookup.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    /// Cache key this entry is stored under.
    pub key: String,
    /// Frame index the bytes were rendered for.
    pub frame: FrameIndex,
    /// Unix-millisecond creation timestamp; drives TTL expiry.
    pub created_ms: u64,
    /// Rendered frame bytes.
    pub data: Arc<Vec<u8>>,
    /// Access metadata.
    pub metadata: EntryMetadata,
}

impl CacheEntry {
    /// Size this entry accounts for against the memory budget.
    pub(crate) fn byte_size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Whether this entry has outlived `ttl` relative to `now_ms`.
    pub(crate) fn is_expired(&self, ttl: Option<std::time::Duration>, now_ms: u64) -> bool {
        match ttl {
            Some(ttl) => now_ms.saturating_sub(self.created_ms) > ttl.as_millis() as u64,
            None => false,
        }
    }
}

/// Serialized header of an on-disk cache record; the frame bytes follow it.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct DiskEntryHeader {
    pub(crate) key: String,
    pub(crate) frame: FrameIndex,
    pub(crate) created_ms: u64,
    pub(crate) metadata: EntryMetadata,
}

impl DiskEntryHeader {
    pub(crate) fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.clone(),
            frame: entry.frame,
            created_ms: entry.created_ms,
            metadata: entry.metadata.clone(),
        }
    }

    pub(crate) fn into_entry(self, data: Vec<u8>) -> CacheEntry {
        CacheEntry {
            key: self.key,
            frame: self.frame,
            created_ms: self.created_ms,
            data: Arc::new(data),
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(created_ms: u64) -> CacheEntry {
        CacheEntry {
            key: "k".to_owned(),
            frame: FrameIndex(0),
            created_ms,
            data: Arc::new(vec![0u8; 64]),
            metadata: EntryMetadata {
                width: 8,
                height: 8,
                format: OutputFormat::Raw,
                quality: 100,
                render_time_ms: 1.0,
                hit_count: 0,
                last_access_ms: created_ms,
            },
        }
    }

    #[test]
    fn byte_size_tracks_payload() {
        assert_eq!(entry(0).byte_size(), 64);
    }

    #[test]
    fn ttl_expiry_is_relative_to_creation() {
        let e = entry(1_000);
        assert!(!e.is_expired(None, u64::MAX));
        assert!(!e.is_expired(Some(Duration::from_millis(500)), 1_400));
        assert!(e.is_expired(Some(Duration::from_millis(500)), 1_600));
    }
}
