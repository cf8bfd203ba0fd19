//! Hash-partitioned front-end over independently locked caches.
//!
//! A [`BucketedCache`] spreads keys across `bucket_count` buckets, each a
//! complete [`Cache`] with its own lock, loader group, and counters. Point
//! operations touch exactly one bucket; aggregate operations visit buckets
//! one at a time and never hold more than one bucket lock, so concurrent
//! writers may interleave with them.
//!
//! ```text
//!                        hash64(key) % bucket_count
//!                                  │
//!        ┌──────────┬──────────────┼──────────────┬──────────┐
//!        ▼          ▼              ▼              ▼          ▼
//!   ┌─────────┐┌─────────┐   ┌─────────┐    ┌─────────┐┌─────────┐
//!   │ bucket 0││ bucket 1│   │ bucket 2│    │   ...   ││ bucket N│
//!   │  Cache  ││  Cache  │   │  Cache  │    │         ││  Cache  │
//!   └─────────┘└─────────┘   └─────────┘    └─────────┘└─────────┘
//! ```
//!
//! The front-end keeps its own hit/miss counters: a lookup answered from a
//! bucket counts as a hit, while a `KeyNotFound` miss and a loader-resolved
//! lookup both count as misses, keeping the hit rate a property of the
//! cache rather than of the loader.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::builder::{CacheBuilder, EvictionPolicy};
use crate::cache::Cache;
use crate::clock::Clock;
use crate::ds::shard::BucketSelector;
use crate::error::{CacheError, DynError};
use crate::policy::Engine;
use crate::stats::{CacheStats, StatsSnapshot};

/// Bucket count used when none (or zero) is configured.
pub const DEFAULT_BUCKET_COUNT: usize = 32;

/// Per-bucket counters reported by [`BucketedCache::bucket_stats`].
#[derive(Debug, Clone, Copy)]
pub struct BucketStats {
    /// Resident entries in the bucket, excluding expired ones.
    pub len: usize,
    /// Bucket-level hits.
    pub hits: u64,
    /// Bucket-level misses.
    pub misses: u64,
    /// Bucket-level hit rate.
    pub hit_rate: f64,
}

/// Concurrent cache front-end that partitions keys across buckets.
///
/// # Example
///
/// ```
/// use bucketcache::{BucketedCacheBuilder, EvictionPolicy};
///
/// let cache = BucketedCacheBuilder::new(100)
///     .bucket_count(4)
///     .policy(EvictionPolicy::Lru)
///     .build()
///     .unwrap();
///
/// cache.set("user:1", 41).unwrap();
/// assert_eq!(cache.get(&"user:1").unwrap(), 41);
/// assert_eq!(cache.hit_count(), 1);
/// ```
pub struct BucketedCache<K, V> {
    buckets: Vec<Cache<K, V>>,
    selector: BucketSelector,
    stats: CacheStats,
}

impl<K, V> BucketedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn bucket_for(&self, key: &K) -> &Cache<K, V> {
        &self.buckets[self.selector.bucket_for_key(key)]
    }

    /// Inserts or updates `key` in its bucket.
    pub fn set(&self, key: K, value: V) -> Result<(), CacheError> {
        self.bucket_for(&key).set(key, value)
    }

    /// Inserts or updates `key` with a per-entry time-to-live.
    pub fn set_with_expire(&self, key: K, value: V, ttl: Duration) -> Result<(), CacheError> {
        self.bucket_for(&key).set_with_expire(key, value, ttl)
    }

    /// Returns the value for `key`, blocking on a configured loader.
    ///
    /// Counts a hit when the value came from cache; a miss when the key
    /// was absent or the loader produced the value.
    pub fn get(&self, key: &K) -> Result<V, CacheError> {
        match self.bucket_for(key).lookup(key, true) {
            Ok(lookup) => {
                if lookup.from_cache {
                    self.stats.record_hit();
                } else {
                    self.stats.record_miss();
                }
                Ok(lookup.value)
            },
            Err(err) => {
                if err.is_not_found() {
                    self.stats.record_miss();
                }
                Err(err)
            },
        }
    }

    /// Like [`get`](Self::get) but never waits for a loader.
    pub fn get_if_present(&self, key: &K) -> Result<V, CacheError> {
        match self.bucket_for(key).lookup(key, false) {
            Ok(lookup) => {
                if lookup.from_cache {
                    self.stats.record_hit();
                } else {
                    self.stats.record_miss();
                }
                Ok(lookup.value)
            },
            Err(err) => {
                if err.is_not_found() {
                    self.stats.record_miss();
                }
                Err(err)
            },
        }
    }

    /// Returns the value without touching policy state or statistics.
    pub fn peek(&self, key: &K) -> Result<V, CacheError> {
        self.bucket_for(key).peek(key)
    }

    /// Returns `true` if `key` is resident and not expired.
    pub fn has(&self, key: &K) -> bool {
        self.bucket_for(key).has(key)
    }

    /// Removes `key`; returns whether it was tracked.
    pub fn remove(&self, key: &K) -> bool {
        self.bucket_for(key).remove(key)
    }

    /// Keys across all buckets. No cross-bucket snapshot consistency is
    /// guaranteed.
    pub fn keys(&self, check_expired: bool) -> Vec<K> {
        let mut keys = Vec::new();
        for bucket in &self.buckets {
            keys.extend(bucket.keys(check_expired));
        }
        keys
    }

    /// Entries across all buckets.
    pub fn get_all(&self, check_expired: bool) -> Vec<(K, V)> {
        let mut entries = Vec::new();
        for bucket in &self.buckets {
            entries.extend(bucket.get_all(check_expired));
        }
        entries
    }

    /// Total resident entries across buckets.
    pub fn len(&self, check_expired: bool) -> usize {
        self.buckets
            .iter()
            .map(|bucket| bucket.len(check_expired))
            .sum()
    }

    /// Returns `true` if no bucket holds a resident entry.
    pub fn is_empty(&self) -> bool {
        self.len(false) == 0
    }

    /// Purges every bucket, one at a time.
    pub fn purge(&self) {
        for bucket in &self.buckets {
            bucket.purge();
        }
    }

    /// Number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Bucket index `key` maps to (debugging aid).
    pub fn bucket_index(&self, key: &K) -> usize {
        self.selector.bucket_for_key(key)
    }

    /// Front-end hits.
    pub fn hit_count(&self) -> u64 {
        self.stats.hit_count()
    }

    /// Front-end misses (including loader-resolved lookups).
    pub fn miss_count(&self) -> u64 {
        self.stats.miss_count()
    }

    /// Total front-end lookups.
    pub fn lookup_count(&self) -> u64 {
        self.stats.lookup_count()
    }

    /// Fraction of lookups answered from cache.
    pub fn hit_rate(&self) -> f64 {
        self.stats.hit_rate()
    }

    /// Point-in-time copy of the front-end counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Per-bucket length and counters, for inspection.
    pub fn bucket_stats(&self) -> Vec<BucketStats> {
        self.buckets
            .iter()
            .map(|bucket| BucketStats {
                len: bucket.len(true),
                hits: bucket.hit_count(),
                misses: bucket.miss_count(),
                hit_rate: bucket.hit_rate(),
            })
            .collect()
    }
}

/// Builder for a [`BucketedCache`].
///
/// `bucket_size` is the capacity of each bucket; the bucket count defaults
/// to [`DEFAULT_BUCKET_COUNT`] and a zero count is coerced back to the
/// default.
pub struct BucketedCacheBuilder<K, V> {
    bucket_count: usize,
    inner: CacheBuilder<K, V>,
}

impl<K, V> BucketedCacheBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Starts a builder with `bucket_size` capacity per bucket.
    pub fn new(bucket_size: usize) -> Self {
        Self {
            bucket_count: DEFAULT_BUCKET_COUNT,
            inner: CacheBuilder::new(bucket_size),
        }
    }

    /// Sets the number of buckets; zero falls back to the default.
    pub fn bucket_count(mut self, count: usize) -> Self {
        self.bucket_count = if count == 0 {
            DEFAULT_BUCKET_COUNT
        } else {
            count
        };
        self
    }

    /// Selects the eviction policy for every bucket.
    pub fn policy(mut self, policy: EvictionPolicy) -> Self {
        self.inner = self.inner.policy(policy);
        self
    }

    /// Default time-to-live for stored entries.
    pub fn expiration(mut self, ttl: Duration) -> Self {
        self.inner = self.inner.expiration(ttl);
        self
    }

    /// Injects the time source used for expiration checks.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.inner = self.inner.clock(clock);
        self
    }

    /// Loader invoked on `get` misses; see [`CacheBuilder::loader`].
    pub fn loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&K) -> Result<V, DynError> + Send + Sync + 'static,
    {
        self.inner = self.inner.loader(loader);
        self
    }

    /// Loader variant that also decides the entry's time-to-live.
    pub fn loader_with_expire<F>(mut self, loader: F) -> Self
    where
        F: Fn(&K) -> Result<(V, Option<Duration>), DynError> + Send + Sync + 'static,
    {
        self.inner = self.inner.loader_with_expire(loader);
        self
    }

    /// Callback invoked after every successful insert.
    pub fn added_fn<F>(mut self, hook: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.inner = self.inner.added_fn(hook);
        self
    }

    /// Callback invoked when a resident entry is evicted or removed.
    pub fn evicted_fn<F>(mut self, hook: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.inner = self.inner.evicted_fn(hook);
        self
    }

    /// Callback invoked by purge once per resident entry.
    pub fn purge_visitor_fn<F>(mut self, hook: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.inner = self.inner.purge_visitor_fn(hook);
        self
    }

    /// Transform applied on the store path.
    pub fn serialize_fn<F>(mut self, transform: F) -> Self
    where
        F: Fn(&K, V) -> Result<V, DynError> + Send + Sync + 'static,
    {
        self.inner = self.inner.serialize_fn(transform);
        self
    }

    /// Transform applied on the retrieve path.
    pub fn deserialize_fn<F>(mut self, transform: F) -> Self
    where
        F: Fn(&K, V) -> Result<V, DynError> + Send + Sync + 'static,
    {
        self.inner = self.inner.deserialize_fn(transform);
        self
    }

    /// Builds the bucketed cache.
    pub fn build(self) -> Result<BucketedCache<K, V>, CacheError> {
        let mut buckets = Vec::with_capacity(self.bucket_count);
        for _ in 0..self.bucket_count {
            let engine = Engine::new(self.inner.policy, self.inner.capacity)?;
            buckets.push(Cache::from_parts(engine, self.inner.config.clone()));
        }
        Ok(BucketedCache {
            selector: BucketSelector::new(self.bucket_count, 0),
            buckets,
            stats: CacheStats::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bucket_count_is_32() {
        let cache = BucketedCacheBuilder::<u64, u64>::new(8).build().unwrap();
        assert_eq!(cache.bucket_count(), 32);
    }

    #[test]
    fn zero_bucket_count_falls_back_to_default() {
        let cache = BucketedCacheBuilder::<u64, u64>::new(8)
            .bucket_count(0)
            .build()
            .unwrap();
        assert_eq!(cache.bucket_count(), DEFAULT_BUCKET_COUNT);
    }

    #[test]
    fn bucket_index_is_stable() {
        let cache = BucketedCacheBuilder::<String, u64>::new(8)
            .bucket_count(4)
            .build()
            .unwrap();
        let key = "stable".to_string();
        let index = cache.bucket_index(&key);
        assert!(index < 4);
        assert_eq!(cache.bucket_index(&key), index);
    }

    #[test]
    fn zero_capacity_bounded_policy_fails_to_build() {
        let result = BucketedCacheBuilder::<u64, u64>::new(0)
            .policy(EvictionPolicy::Lru)
            .build();
        assert!(matches!(result, Err(CacheError::CapacityInvalid)));
    }
}
