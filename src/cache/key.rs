use sha2::Digest as _;

use crate::foundation::core::{FrameIndex, OutputFormat};

/// Hex characters kept from the parameter digest half of a cache key.
const KEY_DIGEST_LEN: usize = 16;

/// Identity of a single rendered frame for caching purposes.
///
/// Two parameter sets that compare equal always derive the identical key;
/// that equality is the basis of the at-most-once-render guarantee.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheKeyParams<'a> {
    /// Content hash of the scene snapshot the frame was evaluated from.
    pub scene_hash: &'a str,
    /// Frame index within the scene timeline.
    pub frame: FrameIndex,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output format.
    pub format: OutputFormat,
    /// Encoder quality in `[0, 100]`.
    pub quality: u8,
}

/// Derive the deterministic cache key for a parameter tuple.
///
/// Layout is `{scene_hash}_{digest16}`: the scene hash stays in the clear so
/// `invalidate("{scene_hash}_*")` can address every frame rendered under one
/// scene version without a separate index, while the digest half is a
/// truncated SHA-256 over the canonical parameter string. Pure function, no
/// side effects, stable across process restarts (disk-tier entries must
/// remain addressable).
pub fn generate_cache_key(params: &CacheKeyParams<'_>) -> String {
    let canonical = format!(
        "{}:{}:{}x{}:{}:{}",
        params.scene_hash,
        params.frame.0,
        params.width,
        params.height,
        params.format.as_str(),
        params.quality,
    );
    let digest = sha2::Sha256::digest(canonical.as_bytes());
    let mut hex = String::with_capacity(KEY_DIGEST_LEN);
    for b in digest {
        hex.push_str(&format!("{:02x}", b));
        if hex.len() >= KEY_DIGEST_LEN {
            break;
        }
    }
    hex.truncate(KEY_DIGEST_LEN);
    format!("{}_{}", params.scene_hash, hex)
}

/// Match a key against a wildcard pattern where `*` matches any sequence.
///
/// This is the full pattern language of the invalidation API; anything richer
/// belongs to the caller.
pub(crate) fn key_matches_pattern(key: &str, pattern: &str) -> bool {
    let k: &[u8] = key.as_bytes();
    let p: &[u8] = pattern.as_bytes();

    // Classic two-pointer glob over `*` only: remember the last star and the
    // key position it matched up to, and rewind on mismatch.
    let (mut ki, mut pi) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ki < k.len() {
        if pi < p.len() && (p[pi] == k[ki]) {
            ki += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == b'*' {
            star = Some((pi, ki));
            pi += 1;
        } else if let Some((sp, sk)) = star {
            pi = sp + 1;
            ki = sk + 1;
            star = Some((sp, sk + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == b'*' {
        pi += 1;
    }
    pi == p.len()
}
