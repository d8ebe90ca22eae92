use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::entry::{CacheEntry, DiskEntryHeader, EntryMetadata};
use crate::cache::key::key_matches_pattern;
use crate::cache::record::{read_record, write_record};
use crate::foundation::core::{FrameIndex, OutputFormat, now_unix_ms};
use crate::foundation::error::{FrameloomError, FrameloomResult};

/// Configuration for [`RenderCache`].
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Total memory budget in bytes for the in-memory tier.
    pub max_memory_size: u64,
    /// Total disk budget in bytes for the persisted tier.
    pub max_disk_size: u64,
    /// Maximum number of entries held in the memory tier.
    pub max_entries: usize,
    /// Directory persisted entries are written to.
    pub cache_dir: PathBuf,
    /// Global kill switch; when `false` every operation is a structural no-op.
    pub enabled: bool,
    /// Fraction of `max_memory_size` the memory tier may occupy before
    /// eviction triggers, in `(0, 1]`.
    pub memory_weight: f64,
    /// Accepted for configuration compatibility; entries are currently stored
    /// uncompressed.
    pub compression_enabled: bool,
    /// Entry time-to-live; expired entries are treated as misses.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_size: 256 * 1024 * 1024,
            max_disk_size: 1024 * 1024 * 1024,
            max_entries: 1000,
            cache_dir: std::env::temp_dir().join("frameloom-cache"),
            enabled: true,
            memory_weight: 0.8,
            compression_enabled: false,
            ttl: Some(Duration::from_secs(60 * 60)),
        }
    }
}

impl CacheConfig {
    fn validate(&self) -> FrameloomResult<()> {
        if !(self.memory_weight > 0.0 && self.memory_weight <= 1.0) {
            return Err(FrameloomError::validation(
                "cache memory_weight must be in (0, 1]",
            ));
        }
        if self.max_entries == 0 {
            return Err(FrameloomError::validation("cache max_entries must be >= 1"));
        }
        Ok(())
    }
}

/// Which tier served a lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupSource {
    /// Served from the in-memory tier.
    Memory,
    /// Served from the disk tier (the entry was promoted to memory).
    Disk,
    /// Not found in either tier.
    None,
}

/// Result of [`RenderCache::lookup`].
#[derive(Clone, Debug)]
pub struct Lookup {
    /// Whether the key was found.
    pub hit: bool,
    /// The entry, with `hit_count`/`last_access_ms` already bumped.
    pub entry: Option<CacheEntry>,
    /// Tier that served the request.
    pub source: LookupSource,
    /// Time the lookup took, for observability.
    pub lookup_time: Duration,
}

/// Result of [`RenderCache::store`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreOutcome {
    /// Whether the entry was inserted into the memory tier.
    pub stored: bool,
    /// Number of entries evicted (relocated to disk) to make room.
    pub evicted: usize,
}

/// Fixed per-frame metadata supplied at store time.
#[derive(Clone, Copy, Debug)]
pub struct FrameMetadata {
    /// Rendered width in pixels.
    pub width: u32,
    /// Rendered height in pixels.
    pub height: u32,
    /// Output format of the stored bytes.
    pub format: OutputFormat,
    /// Encoder quality the frame was rendered at.
    pub quality: u8,
    /// Wall-clock render time in milliseconds.
    pub render_time_ms: f64,
}

/// Aggregate cache statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CacheStats {
    /// Whether the cache is enabled.
    pub enabled: bool,
    /// Bytes currently held by the memory tier.
    pub memory_used: u64,
    /// Entry count in the memory tier.
    pub memory_entries: usize,
    /// Bytes currently held by the disk tier.
    pub disk_used: u64,
    /// Entry count in the disk tier.
    pub disk_entries: usize,
    /// Total lookup hits since construction or the last [`RenderCache::clear`].
    pub total_hits: u64,
    /// Total lookup misses.
    pub total_misses: u64,
    /// `total_hits / (total_hits + total_misses)`; 0.0 with no requests.
    pub hit_rate: f64,
    /// Mean lookup latency.
    pub average_lookup_time: Duration,
    /// Total memory-tier evictions.
    pub total_evictions: u64,
}

struct MemEntry {
    entry: CacheEntry,
    /// Insertion sequence; breaks LRU ties so eviction order is stable.
    seq: u64,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    lookups: u64,
    lookup_time_total: Duration,
}

struct CacheState {
    entries: HashMap<String, MemEntry>,
    bytes: u64,
    next_seq: u64,
    counters: Counters,
}

enum PersistJob {
    Write {
        path: PathBuf,
        header: DiskEntryHeader,
        data: Arc<Vec<u8>>,
    },
}

/// Two-tier (memory + disk) cache for rendered frame bytes.
///
/// The memory tier is the authoritative copy for the current process; the
/// disk tier extends capacity across evictions and process restarts. The
/// cache is an optimization layer: disk failures degrade to misses or
/// memory-only operation and are never surfaced to the caller.
pub struct RenderCache {
    cfg: CacheConfig,
    disk_enabled: bool,
    state: Mutex<CacheState>,
    persist_tx: Mutex<Option<mpsc::Sender<PersistJob>>>,
    persist_thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl RenderCache {
    /// Construct a cache with the given configuration.
    ///
    /// Cache directory creation failure is a warning, not an error: the cache
    /// continues in memory-only mode.
    pub fn new(cfg: CacheConfig) -> FrameloomResult<Self> {
        cfg.validate()?;

        let mut disk_enabled = cfg.enabled;
        if disk_enabled && let Err(e) = std::fs::create_dir_all(&cfg.cache_dir) {
            warn!(dir = %cfg.cache_dir.display(), error = %e, "cache dir unavailable; running memory-only");
            disk_enabled = false;
        }

        let (persist_tx, persist_thread) = if disk_enabled {
            let (tx, rx) = mpsc::channel::<PersistJob>();
            let max_disk = cfg.max_disk_size;
            let handle = std::thread::Builder::new()
                .name("frameloom-cache-persist".to_owned())
                .spawn(move || persist_loop(rx, max_disk))
                .map_err(anyhow::Error::from)?;
            (Some(tx), Some(handle))
        } else {
            (None, None)
        };

        Ok(Self {
            cfg,
            disk_enabled,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                bytes: 0,
                next_seq: 0,
                counters: Counters::default(),
            }),
            persist_tx: Mutex::new(persist_tx),
            persist_thread: Mutex::new(persist_thread),
        })
    }

    /// Look up a key, checking the memory tier first, then disk.
    ///
    /// A disk hit promotes the entry back into memory (cache warming). Every
    /// hit bumps `hit_count` and `last_access_ms` before the entry is
    /// returned, so statistics stay accurate under concurrent access.
    pub fn lookup(&self, key: &str) -> Lookup {
        let start = Instant::now();
        if !self.cfg.enabled {
            return Lookup {
                hit: false,
                entry: None,
                source: LookupSource::None,
                lookup_time: start.elapsed(),
            };
        }

        let now = now_unix_ms();
        let mut st = self.state.lock();

        if let Some(m) = st.entries.get_mut(key) {
            if m.entry.is_expired(self.cfg.ttl, now) {
                let bytes = m.entry.byte_size();
                st.entries.remove(key);
                st.bytes = st.bytes.saturating_sub(bytes);
                self.remove_disk_file(key);
                return self.finish_miss(&mut st, start);
            }

            m.entry.metadata.hit_count += 1;
            m.entry.metadata.last_access_ms = now;
            let entry = m.entry.clone();
            st.counters.hits += 1;
            let lookup_time = self.record_lookup(&mut st, start);
            return Lookup {
                hit: true,
                entry: Some(entry),
                source: LookupSource::Memory,
                lookup_time,
            };
        }

        if self.disk_enabled
            && let Some(mut entry) = self.load_disk_entry(key)
        {
            if entry.is_expired(self.cfg.ttl, now) {
                self.remove_disk_file(key);
                return self.finish_miss(&mut st, start);
            }

            entry.metadata.hit_count += 1;
            entry.metadata.last_access_ms = now;
            self.insert_with_eviction(&mut st, entry.clone());
            st.counters.hits += 1;
            let lookup_time = self.record_lookup(&mut st, start);
            return Lookup {
                hit: true,
                entry: Some(entry),
                source: LookupSource::Disk,
                lookup_time,
            };
        }

        self.finish_miss(&mut st, start)
    }

    /// Store rendered frame bytes under a key.
    ///
    /// Evicts least-recently-used entries first when the memory tier is over
    /// budget (each evicted entry is written to disk before removal), then
    /// inserts into memory and hands the entry to the background persister.
    /// Never fails: persistence problems degrade to memory-only behavior.
    pub fn store(
        &self,
        key: &str,
        frame: FrameIndex,
        data: impl Into<Arc<Vec<u8>>>,
        meta: FrameMetadata,
    ) -> StoreOutcome {
        if !self.cfg.enabled {
            return StoreOutcome {
                stored: false,
                evicted: 0,
            };
        }

        let now = now_unix_ms();
        let entry = CacheEntry {
            key: key.to_owned(),
            frame,
            created_ms: now,
            data: data.into(),
            metadata: EntryMetadata {
                width: meta.width,
                height: meta.height,
                format: meta.format,
                quality: meta.quality,
                render_time_ms: meta.render_time_ms,
                hit_count: 0,
                last_access_ms: now,
            },
        };

        let mut st = self.state.lock();
        let evicted = self.insert_with_eviction(&mut st, entry.clone());
        drop(st);

        self.persist_async(&entry);

        StoreOutcome {
            stored: true,
            evicted,
        }
    }

    /// Remove every entry (memory and disk) whose key matches a `*`-wildcard
    /// pattern. Returns the number of distinct keys removed.
    ///
    /// The persister queue is drained before the disk scan, so a store that
    /// happened-before this call cannot land its write after the scan and
    /// resurrect an invalidated key.
    pub fn invalidate(&self, pattern: &str) -> usize {
        if !self.cfg.enabled {
            return 0;
        }

        let mut removed = std::collections::HashSet::<String>::new();

        let mut st = self.state.lock();
        let matching: Vec<String> = st
            .entries
            .keys()
            .filter(|k| key_matches_pattern(k, pattern))
            .cloned()
            .collect();
        for k in matching {
            if let Some(m) = st.entries.remove(&k) {
                st.bytes = st.bytes.saturating_sub(m.entry.byte_size());
            }
            removed.insert(k);
        }
        drop(st);

        if self.disk_enabled {
            self.flush();
            for key in self.disk_keys() {
                if key_matches_pattern(&key, pattern) {
                    self.remove_disk_file(&key);
                    removed.insert(key);
                }
            }
        }

        removed.len()
    }

    /// Unconditionally empty both tiers and reset statistics.
    ///
    /// Drains the persister queue first; see [`RenderCache::invalidate`].
    pub fn clear(&self) {
        let mut st = self.state.lock();
        st.entries.clear();
        st.bytes = 0;
        st.counters = Counters::default();
        drop(st);

        if self.disk_enabled {
            self.flush();
            for key in self.disk_keys() {
                self.remove_disk_file(&key);
            }
        }
    }

    /// Remove TTL-expired entries from both tiers. Returns distinct keys
    /// removed.
    pub fn purge_expired(&self) -> usize {
        if !self.cfg.enabled {
            return 0;
        }
        let Some(ttl) = self.cfg.ttl else {
            return 0;
        };

        let now = now_unix_ms();
        let mut removed = std::collections::HashSet::<String>::new();

        let mut st = self.state.lock();
        let expired: Vec<String> = st
            .entries
            .iter()
            .filter(|(_, m)| m.entry.is_expired(Some(ttl), now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in expired {
            if let Some(m) = st.entries.remove(&k) {
                st.bytes = st.bytes.saturating_sub(m.entry.byte_size());
            }
            removed.insert(k);
        }
        drop(st);

        if self.disk_enabled {
            for key in self.disk_keys() {
                if removed.contains(&key) {
                    self.remove_disk_file(&key);
                    continue;
                }
                if let Some(entry) = self.load_disk_entry(&key)
                    && entry.is_expired(Some(ttl), now)
                {
                    self.remove_disk_file(&key);
                    removed.insert(key);
                }
            }
        }

        removed.len()
    }

    /// Snapshot aggregate statistics. Disk usage is computed from a directory
    /// scan; there is deliberately no index file to keep in sync.
    pub fn stats(&self) -> CacheStats {
        let st = self.state.lock();
        let total = st.counters.hits + st.counters.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            st.counters.hits as f64 / total as f64
        };
        let average_lookup_time = if st.counters.lookups == 0 {
            Duration::ZERO
        } else {
            st.counters.lookup_time_total / st.counters.lookups as u32
        };

        let mut stats = CacheStats {
            enabled: self.cfg.enabled,
            memory_used: st.bytes,
            memory_entries: st.entries.len(),
            disk_used: 0,
            disk_entries: 0,
            total_hits: st.counters.hits,
            total_misses: st.counters.misses,
            hit_rate,
            average_lookup_time,
            total_evictions: st.counters.evictions,
        };
        drop(st);

        if self.disk_enabled {
            let (used, count) = disk_usage(&self.cfg.cache_dir);
            stats.disk_used = used;
            stats.disk_entries = count;
        }
        stats
    }

    /// Block until the background persister has drained pending writes.
    ///
    /// Intended for tests and orderly shutdown; normal operation never needs
    /// to wait on the disk tier.
    pub fn flush(&self) {
        // Tear down the persister (drains the channel) and restart it.
        let tx = self.persist_tx.lock().take();
        drop(tx);
        if let Some(handle) = self.persist_thread.lock().take()
            && handle.join().is_err()
        {
            warn!("cache persister thread panicked");
        }

        if self.disk_enabled {
            let (tx, rx) = mpsc::channel::<PersistJob>();
            let max_disk = self.cfg.max_disk_size;
            match std::thread::Builder::new()
                .name("frameloom-cache-persist".to_owned())
                .spawn(move || persist_loop(rx, max_disk))
            {
                Ok(handle) => {
                    *self.persist_tx.lock() = Some(tx);
                    *self.persist_thread.lock() = Some(handle);
                }
                Err(e) => warn!(error = %e, "failed to restart cache persister"),
            }
        }
    }

    fn finish_miss(&self, st: &mut CacheState, start: Instant) -> Lookup {
        st.counters.misses += 1;
        let lookup_time = self.record_lookup(st, start);
        Lookup {
            hit: false,
            entry: None,
            source: LookupSource::None,
            lookup_time,
        }
    }

    fn record_lookup(&self, st: &mut CacheState, start: Instant) -> Duration {
        let elapsed = start.elapsed();
        st.counters.lookups += 1;
        st.counters.lookup_time_total += elapsed;
        elapsed
    }

    /// Insert an entry, evicting LRU entries first if the memory tier is over
    /// budget. Returns the number of entries evicted.
    ///
    /// The byte target is computed once (down to 80% of the threshold), then
    /// the oldest entries by (`last_access_ms`, insertion seq) are relocated
    /// to disk until the target is met or the tier is empty.
    fn insert_with_eviction(&self, st: &mut CacheState, entry: CacheEntry) -> usize {
        let threshold = (self.cfg.max_memory_size as f64 * self.cfg.memory_weight) as u64;
        let floor = (threshold as f64 * 0.8) as u64;

        let mut evicted = 0usize;
        let over_bytes = st.bytes > threshold;
        let over_entries = st.entries.len() >= self.cfg.max_entries;
        if over_bytes || over_entries {
            let mut order: Vec<(u64, u64, String)> = st
                .entries
                .iter()
                .map(|(k, m)| (m.entry.metadata.last_access_ms, m.seq, k.clone()))
                .collect();
            order.sort();

            for (_, _, key) in order {
                let done_bytes = !over_bytes || st.bytes <= floor;
                let done_entries = st.entries.len() < self.cfg.max_entries;
                if done_bytes && done_entries {
                    break;
                }
                if let Some(m) = st.entries.remove(&key) {
                    st.bytes = st.bytes.saturating_sub(m.entry.byte_size());
                    self.spill_to_disk(&m.entry);
                    st.counters.evictions += 1;
                    evicted += 1;
                }
            }
        }

        let seq = st.next_seq;
        st.next_seq += 1;
        let size = entry.byte_size();
        if let Some(old) = st.entries.insert(entry.key.clone(), MemEntry { entry, seq }) {
            st.bytes = st.bytes.saturating_sub(old.entry.byte_size());
        }
        st.bytes += size;
        evicted
    }

    /// Synchronously write an evicted entry to the disk tier.
    ///
    /// Eviction relocates data rather than losing it; if the write fails the
    /// entry is dropped anyway (budget enforcement wins) and the failure is
    /// logged.
    fn spill_to_disk(&self, entry: &CacheEntry) {
        if !self.disk_enabled {
            return;
        }
        let path = self.entry_path(&entry.key);
        if let Err(e) = write_entry_file(&path, &DiskEntryHeader::from_entry(entry), &entry.data) {
            warn!(key = %entry.key, error = %e, "failed to spill evicted cache entry to disk");
        }
    }

    fn persist_async(&self, entry: &CacheEntry) {
        if !self.disk_enabled {
            return;
        }
        let job = PersistJob::Write {
            path: self.entry_path(&entry.key),
            header: DiskEntryHeader::from_entry(entry),
            data: entry.data.clone(),
        };
        let tx = self.persist_tx.lock();
        match tx.as_ref() {
            Some(tx) => {
                if tx.send(job).is_err() {
                    warn!("cache persister channel closed; entry not persisted");
                }
            }
            None => debug!("cache persister not running; entry not persisted"),
        }
    }

    fn load_disk_entry(&self, key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let mut file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(_) => return None,
        };
        match read_record(&mut std::io::BufReader::new(&mut file)) {
            Ok((header, data)) => {
                if header.key != key {
                    warn!(key, stored = %header.key, "cache record key mismatch; treating as miss");
                    return None;
                }
                Some(header.into_entry(data))
            }
            Err(e) => {
                debug!(key, error = %e, "corrupt or truncated cache record; treating as miss");
                None
            }
        }
    }

    fn remove_disk_file(&self, key: &str) {
        if !self.disk_enabled {
            return;
        }
        let path = self.entry_path(key);
        if path.exists()
            && let Err(e) = std::fs::remove_file(&path)
        {
            warn!(key, error = %e, "failed to remove cache file");
        }
    }

    fn disk_keys(&self) -> Vec<String> {
        list_cache_keys(&self.cfg.cache_dir)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cfg.cache_dir.join(format!("{key}.cache"))
    }
}

impl Drop for RenderCache {
    fn drop(&mut self) {
        let tx = self.persist_tx.lock().take();
        drop(tx);
        if let Some(handle) = self.persist_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn persist_loop(rx: mpsc::Receiver<PersistJob>, max_disk_size: u64) {
    while let Ok(job) = rx.recv() {
        match job {
            PersistJob::Write { path, header, data } => {
                if let Err(e) = write_entry_file(&path, &header, &data) {
                    warn!(path = %path.display(), error = %e, "cache persist failed");
                    continue;
                }
                if let Some(dir) = path.parent() {
                    enforce_disk_budget(dir, max_disk_size);
                }
            }
        }
    }
}

fn write_entry_file(path: &Path, header: &DiskEntryHeader, data: &[u8]) -> FrameloomResult<()> {
    let file = std::fs::File::create(path).map_err(anyhow::Error::from)?;
    let mut w = std::io::BufWriter::new(file);
    write_record(&mut w, header, data)?;
    std::io::Write::flush(&mut w).map_err(anyhow::Error::from)?;
    Ok(())
}

fn list_cache_keys(dir: &Path) -> Vec<String> {
    let mut keys = Vec::new();
    let Ok(rd) = std::fs::read_dir(dir) else {
        return keys;
    };
    for entry in rd.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("cache")
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            keys.push(stem.to_owned());
        }
    }
    keys
}

fn disk_usage(dir: &Path) -> (u64, usize) {
    let mut used = 0u64;
    let mut count = 0usize;
    let Ok(rd) = std::fs::read_dir(dir) else {
        return (0, 0);
    };
    for entry in rd.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("cache") {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            used += meta.len();
            count += 1;
        }
    }
    (used, count)
}

/// Delete oldest cache files (by mtime) until the directory fits the budget.
fn enforce_disk_budget(dir: &Path, max_disk_size: u64) {
    let Ok(rd) = std::fs::read_dir(dir) else {
        return;
    };

    let mut files: Vec<(std::time::SystemTime, u64, PathBuf)> = Vec::new();
    let mut total = 0u64;
    for entry in rd.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("cache") {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            let mtime = meta.modified().unwrap_or(std::time::UNIX_EPOCH);
            total += meta.len();
            files.push((mtime, meta.len(), path));
        }
    }

    if total <= max_disk_size {
        return;
    }

    files.sort();
    for (_, len, path) in files {
        if total <= max_disk_size {
            break;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => total = total.saturating_sub(len),
            Err(e) => warn!(path = %path.display(), error = %e, "disk budget eviction failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> FrameMetadata {
        FrameMetadata {
            width: 8,
            height: 8,
            format: OutputFormat::Raw,
            quality: 100,
            render_time_ms: 1.0,
        }
    }

    fn cache_in(dir: &Path, cfg: CacheConfig) -> RenderCache {
        RenderCache::new(CacheConfig {
            cache_dir: dir.to_path_buf(),
            ..cfg
        })
        .unwrap()
    }

    #[test]
    fn disabled_cache_is_a_structural_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(
            tmp.path(),
            CacheConfig {
                enabled: false,
                ..CacheConfig::default()
            },
        );

        let out = cache.store("k", FrameIndex(0), vec![1, 2, 3], meta());
        assert_eq!(
            out,
            StoreOutcome {
                stored: false,
                evicted: 0
            }
        );
        let l = cache.lookup("k");
        assert!(!l.hit);
        assert_eq!(l.source, LookupSource::None);
        assert_eq!(cache.invalidate("*"), 0);

        let stats = cache.stats();
        assert!(!stats.enabled);
        assert_eq!(stats.total_misses, 0, "disabled lookups are not counted");
    }

    #[test]
    fn memory_round_trip_bumps_hit_count() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(tmp.path(), CacheConfig::default());

        cache.store("k1", FrameIndex(5), vec![0u8; 1024], meta());
        let l = cache.lookup("k1");
        assert!(l.hit);
        assert_eq!(l.source, LookupSource::Memory);
        let entry = l.entry.unwrap();
        assert_eq!(entry.data.len(), 1024);
        assert_eq!(entry.metadata.hit_count, 1);
        assert_eq!(entry.frame, FrameIndex(5));

        let l2 = cache.lookup("k1");
        assert_eq!(l2.entry.unwrap().metadata.hit_count, 2);
    }

    #[test]
    fn eviction_relocates_lru_entries_to_disk() {
        let tmp = tempfile::tempdir().unwrap();
        // 1 KiB budget at weight 1.0: two 600-byte entries exceed it, so the
        // third store trips eviction.
        let cache = cache_in(
            tmp.path(),
            CacheConfig {
                max_memory_size: 1024,
                memory_weight: 1.0,
                ..CacheConfig::default()
            },
        );

        cache.store("a", FrameIndex(0), vec![0u8; 600], meta());
        cache.store("b", FrameIndex(1), vec![0u8; 600], meta());
        // Touch "b" so "a" is the LRU entry.
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.lookup("b").hit);

        let out = cache.store("c", FrameIndex(2), vec![0u8; 600], meta());
        assert!(out.evicted >= 1);

        let st = cache.state.lock();
        assert!(!st.entries.contains_key("a"), "LRU entry evicted first");
        drop(st);

        // Evicted entry is retrievable from disk and promoted back.
        let l = cache.lookup("a");
        assert!(l.hit);
        assert_eq!(l.source, LookupSource::Disk);
        let l2 = cache.lookup("a");
        assert_eq!(l2.source, LookupSource::Memory);
    }

    #[test]
    fn invalidate_by_pattern_is_scoped() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(tmp.path(), CacheConfig::default());

        cache.store("scene123_aa", FrameIndex(0), vec![1], meta());
        cache.store("scene123_bb", FrameIndex(1), vec![2], meta());
        cache.store("scene999_cc", FrameIndex(2), vec![3], meta());
        cache.flush();

        assert_eq!(cache.invalidate("scene123_*"), 2);
        assert!(!cache.lookup("scene123_aa").hit);
        assert!(!cache.lookup("scene123_bb").hit);
        assert!(cache.lookup("scene999_cc").hit);
    }

    #[test]
    fn invalidate_is_ordered_against_pending_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(tmp.path(), CacheConfig::default());

        // A large payload keeps the background write in flight while the
        // invalidation runs; the disk tier must not resurrect the key once
        // that write lands.
        cache.store("scene1_aa", FrameIndex(0), vec![0u8; 4 * 1024 * 1024], meta());
        assert_eq!(cache.invalidate("scene1_*"), 1);

        cache.flush();
        let l = cache.lookup("scene1_aa");
        assert!(!l.hit);
        assert_eq!(l.source, LookupSource::None);
        assert_eq!(cache.stats().disk_entries, 0);
    }

    #[test]
    fn ttl_expired_entries_are_misses() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(
            tmp.path(),
            CacheConfig {
                ttl: Some(Duration::from_millis(20)),
                ..CacheConfig::default()
            },
        );

        cache.store("k", FrameIndex(0), vec![0u8; 16], meta());
        assert!(cache.lookup("k").hit);
        std::thread::sleep(Duration::from_millis(40));
        let l = cache.lookup("k");
        assert!(!l.hit);
        assert_eq!(l.source, LookupSource::None);
    }

    #[test]
    fn hit_rate_is_bounded_and_zero_without_requests() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(tmp.path(), CacheConfig::default());

        assert_eq!(cache.stats().hit_rate, 0.0);

        cache.lookup("missing");
        assert_eq!(cache.stats().hit_rate, 0.0);

        cache.store("k", FrameIndex(0), vec![1], meta());
        cache.lookup("k");
        let rate = cache.stats().hit_rate;
        assert!(rate > 0.0 && rate <= 1.0);
        assert_eq!(rate, 0.5);
    }

    #[test]
    fn clear_empties_both_tiers_and_resets_stats() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(tmp.path(), CacheConfig::default());

        cache.store("k", FrameIndex(0), vec![0u8; 64], meta());
        cache.lookup("k");
        cache.flush();
        cache.clear();

        let stats = cache.stats();
        assert_eq!(stats.memory_entries, 0);
        assert_eq!(stats.disk_entries, 0);
        assert_eq!(stats.total_hits, 0);
        assert!(!cache.lookup("k").hit);
    }

    #[test]
    fn corrupt_disk_record_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(tmp.path(), CacheConfig::default());

        std::fs::write(tmp.path().join("badkey.cache"), b"\xff\xff\xff\xffgarbage").unwrap();
        let l = cache.lookup("badkey");
        assert!(!l.hit);
        assert_eq!(l.source, LookupSource::None);
    }

    #[test]
    fn purge_expired_removes_only_expired_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(
            tmp.path(),
            CacheConfig {
                ttl: Some(Duration::from_millis(30)),
                ..CacheConfig::default()
            },
        );

        cache.store("old", FrameIndex(0), vec![1], meta());
        std::thread::sleep(Duration::from_millis(50));
        cache.store("fresh", FrameIndex(1), vec![2], meta());

        let purged = cache.purge_expired();
        assert_eq!(purged, 1);
        assert!(!cache.lookup("old").hit);
        assert!(cache.lookup("fresh").hit);
    }
}
