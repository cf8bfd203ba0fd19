//! Thread-safe hit/miss counters.
//!
//! One [`CacheStats`] instance lives in every cache, and the bucketed
//! front-end keeps a second aggregate instance on top of the per-bucket
//! counters. Increments are relaxed atomics; readers see each counter as a
//! monotone sequence but snapshots across counters are not atomic.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hit/miss/lookup counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of lookups answered from cache.
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of lookups that missed (including loader-resolved lookups).
    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Total lookups: `hit_count + miss_count`.
    pub fn lookup_count(&self) -> u64 {
        self.hit_count() + self.miss_count()
    }

    /// Fraction of lookups answered from cache, or `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hit_count();
        let total = hits + self.miss_count();
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    /// Captures the counters at one point in time.
    pub fn snapshot(&self) -> StatsSnapshot {
        let hits = self.hit_count();
        let misses = self.miss_count();
        StatsSnapshot {
            hits,
            misses,
            lookups: hits + misses,
        }
    }
}

/// Point-in-time copy of [`CacheStats`] counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Lookups answered from cache.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
    /// Total lookups.
    pub lookups: u64,
}
