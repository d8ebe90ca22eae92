use std::path::Path;

use frameloom::{
    CacheConfig, CacheKeyParams, FrameIndex, FrameMetadata, LookupSource, OutputFormat,
    RenderCache, generate_cache_key,
};

fn meta() -> FrameMetadata {
    FrameMetadata {
        width: 1920,
        height: 1080,
        format: OutputFormat::Png,
        quality: 90,
        render_time_ms: 12.5,
    }
}

fn cache_in(dir: &Path) -> RenderCache {
    RenderCache::new(CacheConfig {
        cache_dir: dir.to_path_buf(),
        ..CacheConfig::default()
    })
    .unwrap()
}

fn key_for(scene_hash: &str, frame: u64) -> String {
    generate_cache_key(&CacheKeyParams {
        scene_hash,
        frame: FrameIndex(frame),
        width: 1920,
        height: 1080,
        format: OutputFormat::Png,
        quality: 90,
    })
}

#[test]
fn store_then_lookup_round_trips_bytes_and_metadata() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = cache_in(tmp.path());

    let key = key_for("abc123def4567890", 5);
    let data = vec![7u8; 1024];
    let out = cache.store(&key, FrameIndex(5), data.clone(), meta());
    assert!(out.stored);

    let l = cache.lookup(&key);
    assert!(l.hit);
    assert_eq!(l.source, LookupSource::Memory);
    let entry = l.entry.unwrap();
    assert_eq!(*entry.data, data);
    assert_eq!(entry.frame, FrameIndex(5));
    assert_eq!(entry.metadata.hit_count, 1);
    assert_eq!(entry.metadata.width, 1920);
    assert_eq!(entry.metadata.format, OutputFormat::Png);
}

#[test]
fn disk_tier_survives_cache_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let key = key_for("feedfacefeedface", 0);

    {
        let cache = cache_in(tmp.path());
        cache.store(&key, FrameIndex(0), vec![42u8; 256], meta());
        cache.flush();
    }

    // Fresh instance over the same directory: memory tier is empty, the
    // disk tier serves the first hit and promotes the entry.
    let cache = cache_in(tmp.path());
    let l = cache.lookup(&key);
    assert!(l.hit);
    assert_eq!(l.source, LookupSource::Disk);
    assert_eq!(l.entry.unwrap().data.len(), 256);

    let l2 = cache.lookup(&key);
    assert_eq!(l2.source, LookupSource::Memory);
}

#[test]
fn invalidation_by_scene_hash_is_scoped() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = cache_in(tmp.path());

    let scene_a = "aaaa111122223333";
    let scene_b = "bbbb444455556666";
    let a0 = key_for(scene_a, 0);
    let a1 = key_for(scene_a, 1);
    let b0 = key_for(scene_b, 0);

    cache.store(&a0, FrameIndex(0), vec![1], meta());
    cache.store(&a1, FrameIndex(1), vec![2], meta());
    cache.store(&b0, FrameIndex(0), vec![3], meta());

    let removed = cache.invalidate(&format!("{scene_a}_*"));
    assert_eq!(removed, 2);
    assert!(!cache.lookup(&a0).hit);
    assert!(!cache.lookup(&a1).hit);
    assert!(cache.lookup(&b0).hit, "other scene untouched");
}

#[test]
fn invalidation_wins_against_in_flight_persists() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = cache_in(tmp.path());
    let key = key_for("cccc777788889999", 0);

    // No flush between store and invalidate: the background write may still
    // be queued when the invalidation runs, and must not land afterwards.
    cache.store(&key, FrameIndex(0), vec![0u8; 2 * 1024 * 1024], meta());
    assert_eq!(cache.invalidate("cccc777788889999_*"), 1);

    cache.flush();
    assert!(!cache.lookup(&key).hit);
    assert_eq!(cache.stats().disk_entries, 0);
}

#[test]
fn eviction_relocates_rather_than_loses() {
    let tmp = tempfile::tempdir().unwrap();
    // Tight budget: five 600-byte entries cannot all stay in memory.
    let cache = RenderCache::new(CacheConfig {
        cache_dir: tmp.path().to_path_buf(),
        max_memory_size: 1024,
        memory_weight: 1.0,
        ..CacheConfig::default()
    })
    .unwrap();

    let keys: Vec<String> = (0..5).map(|i| key_for("cafe0000cafe0000", i)).collect();
    for (i, key) in keys.iter().enumerate() {
        cache.store(key, FrameIndex(i as u64), vec![i as u8; 600], meta());
    }
    cache.flush();

    assert!(cache.stats().total_evictions >= 1);
    // Every stored frame is still retrievable from one tier or the other.
    for (i, key) in keys.iter().enumerate() {
        let l = cache.lookup(key);
        assert!(l.hit, "entry {i} lost after eviction");
        assert_eq!(l.entry.unwrap().data[0], i as u8);
    }
}

#[test]
fn stats_observe_both_tiers() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = cache_in(tmp.path());

    cache.store(&key_for("0123456789abcdef", 0), FrameIndex(0), vec![0u8; 128], meta());
    cache.flush();

    let stats = cache.stats();
    assert!(stats.enabled);
    assert_eq!(stats.memory_entries, 1);
    assert!(stats.memory_used >= 128);
    assert_eq!(stats.disk_entries, 1);
    assert!(stats.disk_used > 128, "disk record carries a header");
}
