// ==============================================
// BUCKETED FRONT-END TESTS (integration)
// ==============================================
//
// The hash-partitioned front-end: point-op forwarding, aggregate views,
// front-end statistics semantics, and behavior under thread contention.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bucketcache::{BucketedCacheBuilder, CacheError, EvictionPolicy, ManualClock};

#[test]
fn point_ops_roundtrip_across_policies() {
    for policy in [
        EvictionPolicy::Simple,
        EvictionPolicy::Lru,
        EvictionPolicy::Lfu,
        EvictionPolicy::Arc,
        EvictionPolicy::Lirs,
    ] {
        let cache = BucketedCacheBuilder::new(10)
            .bucket_count(4)
            .policy(policy)
            .build()
            .unwrap();

        for i in 0..20u32 {
            cache.set(i, i * 10).unwrap();
        }
        for i in 0..20u32 {
            if cache.has(&i) {
                assert_eq!(cache.get(&i).unwrap(), i * 10, "{:?}", policy);
            }
        }

        let present: Vec<u32> = cache.keys(true);
        assert!(!present.is_empty(), "{:?}", policy);
        assert!(cache.remove(&present[0]), "{:?}", policy);
        assert!(!cache.has(&present[0]), "{:?}", policy);
    }
}

#[test]
fn keys_spread_over_multiple_buckets() {
    let cache = BucketedCacheBuilder::new(256)
        .bucket_count(8)
        .build()
        .unwrap();

    for i in 0..256u32 {
        cache.set(i, i).unwrap();
    }

    let used = cache
        .bucket_stats()
        .iter()
        .filter(|stats| stats.len > 0)
        .count();
    assert!(used > 1, "keys should hash to more than one bucket");
    assert_eq!(cache.len(false), 256);
}

#[test]
fn aggregate_views_cover_all_buckets() {
    let cache = BucketedCacheBuilder::new(32)
        .bucket_count(4)
        .build()
        .unwrap();

    for i in 0..32u32 {
        cache.set(i, i).unwrap();
    }

    let mut keys = cache.keys(false);
    keys.sort_unstable();
    assert_eq!(keys, (0..32).collect::<Vec<_>>());

    let mut entries = cache.get_all(false);
    entries.sort_unstable();
    assert_eq!(entries.len(), 32);
    assert_eq!(entries[0], (0, 0));

    cache.purge();
    assert!(cache.is_empty());
    assert!(cache.keys(false).is_empty());
}

mod statistics {
    use super::*;

    #[test]
    fn hits_and_misses_are_counted_at_the_front_end() {
        let cache = BucketedCacheBuilder::new(8)
            .bucket_count(2)
            .build()
            .unwrap();

        cache.set("k", 1u32).unwrap();
        cache.get(&"k").unwrap();
        let _ = cache.get(&"absent");
        let _ = cache.get_if_present(&"absent");

        assert_eq!(cache.hit_count(), 1);
        assert_eq!(cache.miss_count(), 2);
        assert_eq!(cache.lookup_count(), 3);
        assert!((cache.hit_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn loader_resolved_lookups_count_as_misses() {
        let cache = BucketedCacheBuilder::new(8)
            .bucket_count(2)
            .loader(|key: &u32| Ok(key + 1))
            .build()
            .unwrap();

        assert_eq!(cache.get(&1).unwrap(), 2); // resolved by the loader
        assert_eq!(cache.get(&1).unwrap(), 2); // served from cache

        assert_eq!(cache.miss_count(), 1);
        assert_eq!(cache.hit_count(), 1);
        assert!((cache.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn loader_failures_do_not_count_as_misses() {
        let cache: bucketcache::BucketedCache<u32, u32> = BucketedCacheBuilder::new(8)
            .bucket_count(2)
            .loader(|_key: &u32| Err("down".into()))
            .build()
            .unwrap();

        assert!(matches!(cache.get(&1), Err(CacheError::LoaderFailed(_))));
        assert_eq!(cache.miss_count(), 0);
        assert_eq!(cache.lookup_count(), 0);
    }

    #[test]
    fn peek_does_not_affect_front_end_stats() {
        let cache = BucketedCacheBuilder::new(8)
            .bucket_count(2)
            .build()
            .unwrap();
        cache.set("k", 1u32).unwrap();

        cache.peek(&"k").unwrap();
        let _ = cache.peek(&"absent");

        assert_eq!(cache.hit_count(), 0);
        assert_eq!(cache.miss_count(), 0);
    }

    #[test]
    fn per_bucket_stats_remain_available() {
        let cache = BucketedCacheBuilder::new(8)
            .bucket_count(2)
            .build()
            .unwrap();

        cache.set("k", 1u32).unwrap();
        cache.get(&"k").unwrap();
        let _ = cache.get(&"absent");

        let stats = cache.bucket_stats();
        assert_eq!(stats.len(), 2);
        let hits: u64 = stats.iter().map(|s| s.hits).sum();
        let misses: u64 = stats.iter().map(|s| s.misses).sum();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
    }
}

mod expiration {
    use super::*;

    #[test]
    fn default_expiration_applies_to_every_bucket() {
        let clock = Arc::new(ManualClock::new());
        let cache = BucketedCacheBuilder::new(16)
            .bucket_count(4)
            .clock(clock.clone())
            .expiration(Duration::from_millis(10))
            .build()
            .unwrap();

        for i in 0..16u32 {
            cache.set(i, i).unwrap();
        }
        assert_eq!(cache.len(true), 16);

        clock.advance(Duration::from_millis(20));
        assert_eq!(cache.len(true), 0);
        assert!(!cache.has(&3));
    }
}

mod callbacks {
    use super::*;

    #[test]
    fn purge_visitor_runs_across_buckets() {
        let visited = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&visited);
        let cache = BucketedCacheBuilder::new(16)
            .bucket_count(4)
            .purge_visitor_fn(move |_k: &u32, _v: &u32| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        for i in 0..12u32 {
            cache.set(i, i).unwrap();
        }
        cache.purge();

        assert_eq!(visited.load(Ordering::SeqCst), 12);
    }
}

mod concurrency {
    use super::*;

    #[test]
    fn mixed_operations_under_contention() {
        let cache = Arc::new(
            BucketedCacheBuilder::new(100)
                .bucket_count(8)
                .build()
                .unwrap(),
        );
        let num_threads = 8;
        let ops_per_thread = 250;

        let handles: Vec<_> = (0..num_threads)
            .map(|thread_id| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..ops_per_thread {
                        let key = format!("thread_{}_{}", thread_id, i % 50);
                        match i % 4 {
                            0 => {
                                cache.set(key, format!("value_{}", i)).unwrap();
                            },
                            1 => {
                                let _ = cache.get_if_present(&key);
                            },
                            2 => {
                                let _ = cache.has(&key);
                            },
                            _ => {
                                if i % 20 == 3 {
                                    cache.remove(&key);
                                }
                            },
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // Every bucket stayed within its capacity.
        assert!(cache.len(false) <= 8 * 100);
        for stats in cache.bucket_stats() {
            assert!(stats.len <= 100);
        }
    }

    #[test]
    fn concurrent_loaders_on_distinct_keys_do_not_serialize_results() {
        let cache = Arc::new(
            BucketedCacheBuilder::new(32)
                .bucket_count(4)
                .loader(|key: &u32| Ok(key * 3))
                .build()
                .unwrap(),
        );

        let handles: Vec<_> = (0..16u32)
            .map(|key| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get(&key).unwrap())
            })
            .collect();

        for (key, handle) in (0..16u32).zip(handles) {
            assert_eq!(handle.join().unwrap(), key * 3);
        }
        assert_eq!(cache.miss_count(), 16);
    }
}
