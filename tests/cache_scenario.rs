//! End-to-end behavior of the city cache through the public API

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use sunmoon::cache::{
    freshness, resolve, CacheError, Coordinates, Deadline, FileLock, Freshness, StopReason,
    DEFAULT_TTL_DAYS,
};
use sunmoon::{CacheConfig, CacheEntry, CacheStore};

fn beijing(now: chrono::DateTime<Utc>) -> CacheEntry {
    CacheEntry::new(
        "Beijing",
        "北京市, 中国",
        Coordinates::new(39.9042, 116.4074).expect("Valid coordinates"),
        "Asia/Shanghai",
        now,
    )
}

#[test]
fn test_resolve_then_expire() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = CacheStore::at(dir.path().join("cache.json"));
    let saved_at = Utc.with_ymd_and_hms(2025, 1, 10, 6, 30, 0).unwrap();

    assert!(resolve(&store.load(), "Beijing").is_none());

    store.upsert(beijing(saved_at)).expect("Upsert should succeed");

    let doc = store.load();
    let entry = resolve(&doc, "PEKING").expect("Alias lookup should hit");
    assert_eq!(entry.normalized, "beijing");
    assert_eq!(entry.timezone_id, "Asia/Shanghai");
    assert_eq!(resolve(&doc, "  北京 ").map(|e| &e.city), Some(&entry.city));

    let ttl = Duration::days(DEFAULT_TTL_DAYS);
    assert_eq!(
        freshness(entry, saved_at + Duration::days(30), ttl),
        Freshness::Fresh
    );

    let later = saved_at + Duration::days(101);
    let entry = resolve(&doc, "beijing").expect("Stale entries are still returned");
    assert_eq!(freshness(entry, later, ttl), Freshness::Stale);
}

#[test]
fn test_custom_alias_survives_reload() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = CacheStore::at(dir.path().join("cache.json"));

    let mut entry = CacheEntry::new(
        "Chengdu",
        "成都市, 中国",
        Coordinates::new(30.5728, 104.0668).expect("Valid coordinates"),
        "Asia/Shanghai",
        Utc::now(),
    );
    entry.add_alias("蓉城");
    store.upsert(entry).expect("Upsert should succeed");

    let doc = store.load();
    let hit = resolve(&doc, "蓉城").expect("Custom alias should hit");
    assert_eq!(hit.city, "Chengdu");
    assert!(resolve(&doc, "Chongqing").is_none());
}

#[test]
fn test_corrupt_cache_is_replaced_on_save() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join("cache.json");
    std::fs::write(&path, [0xff, 0xfe, b'{']).expect("Failed to write corrupt cache");

    let store = CacheStore::at(&path);
    assert!(store.load().is_empty());

    store.upsert(beijing(Utc::now())).expect("Upsert should succeed");
    let doc = store.load();
    assert_eq!(doc.len(), 1);
    assert!(doc.get("beijing").is_some());
}

#[test]
fn test_writers_see_each_others_entries() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join("cache.json");
    let cities = [
        ("Shanghai", 31.2304, 121.4737),
        ("Guangzhou", 23.1291, 113.2644),
        ("Shenzhen", 22.5431, 114.0579),
        ("Hangzhou", 30.2741, 120.1551),
    ];

    // Writers run one after another so every upsert sees the previous file.
    for (city, lat, lon) in cities {
        let store = CacheStore::at(&path);
        let entry = CacheEntry::new(
            city,
            city,
            Coordinates::new(lat, lon).expect("Valid coordinates"),
            "Asia/Shanghai",
            Utc::now(),
        );
        store.upsert(entry).expect("Upsert should succeed");
    }

    let doc = CacheStore::at(&path).load();
    assert_eq!(doc.len(), cities.len());
    assert!(resolve(&doc, "canton").is_some());
}

#[test]
fn test_held_lock_blocks_save_until_released() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let config = CacheConfig::with_path(dir.path().join("cache.json"))
        .lock_timeout(StdDuration::from_millis(150))
        .poll_interval(StdDuration::from_millis(10));
    let store = CacheStore::new(config);

    let guard = FileLock::new(store.lock_path())
        .acquire(&Deadline::after(StdDuration::from_secs(1)))
        .expect("Lock should be free");

    let err = store.upsert(beijing(Utc::now())).unwrap_err();
    assert!(matches!(
        err,
        CacheError::LockTimeout {
            reason: StopReason::DeadlineExceeded,
            ..
        }
    ));
    assert!(!store.path().exists());

    guard.release();
    store.upsert(beijing(Utc::now())).expect("Upsert should succeed after release");
    assert_eq!(store.load().len(), 1);
}

#[test]
fn test_lock_is_exclusive_across_threads() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let lock_path = dir.path().join("cache.json.lock");
    let barrier = Arc::new(Barrier::new(2));

    let holder = {
        let lock_path = lock_path.clone();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let guard = FileLock::new(&lock_path)
                .acquire(&Deadline::after(StdDuration::from_secs(1)))
                .expect("First acquire should succeed");
            barrier.wait();
            thread::sleep(StdDuration::from_millis(200));
            guard.release();
        })
    };

    barrier.wait();
    let contender = FileLock::new(&lock_path).with_poll_interval(StdDuration::from_millis(10));
    assert!(contender
        .acquire(&Deadline::after(StdDuration::from_millis(50)))
        .is_err());

    let guard = contender
        .acquire(&Deadline::after(StdDuration::from_secs(2)))
        .expect("Acquire should succeed once the holder releases");
    holder.join().expect("Holder thread panicked");
    guard.release();
    assert!(!lock_path.exists());
}
