// ==============================================
// LOADER / SINGLE-FLIGHT TESTS (integration)
// ==============================================
//
// Loader semantics through the public API: single-flight coalescing under
// real thread contention, background loads from get_if_present, loader
// TTLs, and failure propagation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use bucketcache::{CacheBuilder, CacheError, ManualClock};

#[test]
fn concurrent_misses_invoke_the_loader_once() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invocations);

    let cache = CacheBuilder::new(16)
        .lru()
        .loader(move |_key: &String| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            Ok("v".to_string())
        })
        .build()
        .unwrap();

    let threads = 100;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let cache = cache.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get(&"x".to_string())
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), "v");
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[test]
fn sequential_misses_start_separate_episodes() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invocations);

    let cache = CacheBuilder::new(4)
        .lru()
        .loader(move |key: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(key * 2)
        })
        .build()
        .unwrap();

    assert_eq!(cache.get(&1).unwrap(), 2);
    assert_eq!(cache.get(&1).unwrap(), 2); // served from cache
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    cache.remove(&1);
    assert_eq!(cache.get(&1).unwrap(), 2); // fresh episode
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
}

#[test]
fn loader_failure_leaves_cache_unchanged() {
    let cache: bucketcache::Cache<&str, u32> = CacheBuilder::new(4)
        .lru()
        .loader(|_key: &&str| Err("backend unavailable".into()))
        .build()
        .unwrap();

    match cache.get(&"k") {
        Err(CacheError::LoaderFailed(cause)) => {
            assert!(cause.to_string().contains("backend unavailable"));
        },
        other => panic!("expected LoaderFailed, got {:?}", other),
    }
    assert!(cache.is_empty());
    assert!(!cache.has(&"k"));
}

#[test]
fn get_if_present_loads_in_the_background() {
    let cache = CacheBuilder::new(4)
        .lru()
        .loader(|key: &u32| Ok(key + 100))
        .build()
        .unwrap();

    // The first call reports a miss immediately but kicks off the load.
    assert!(matches!(
        cache.get_if_present(&1),
        Err(CacheError::KeyNotFound)
    ));

    // The background load lands shortly after.
    let mut loaded = false;
    for _ in 0..50 {
        if cache.has(&1) {
            loaded = true;
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert!(loaded, "background load never completed");
    assert_eq!(cache.peek(&1).unwrap(), 101);
}

#[test]
fn loader_with_expire_controls_the_entry_ttl() {
    let clock = Arc::new(ManualClock::new());
    let cache = CacheBuilder::new(4)
        .lru()
        .clock(clock.clone())
        .loader_with_expire(|key: &u32| Ok((key + 1, Some(Duration::from_millis(10)))))
        .build()
        .unwrap();

    assert_eq!(cache.get(&1).unwrap(), 2);
    assert!(cache.has(&1));

    clock.advance(Duration::from_millis(20));
    assert!(!cache.has(&1));
}

#[test]
fn loaded_values_count_as_misses_in_per_cache_stats() {
    let cache = CacheBuilder::new(4)
        .lru()
        .loader(|key: &u32| Ok(*key))
        .build()
        .unwrap();

    cache.get(&1).unwrap(); // loader-resolved
    cache.get(&1).unwrap(); // cache hit

    assert_eq!(cache.miss_count(), 1);
    assert_eq!(cache.hit_count(), 1);
}

#[test]
fn set_remove_has_and_peek_never_invoke_the_loader() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invocations);

    let cache = CacheBuilder::new(4)
        .lru()
        .loader(move |_key: &&str| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(0u32)
        })
        .build()
        .unwrap();

    cache.set("k", 1).unwrap();
    let _ = cache.peek(&"absent");
    let _ = cache.has(&"absent");
    cache.remove(&"absent");

    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}
