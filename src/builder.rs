//! Builders for single caches.
//!
//! [`CacheBuilder`] configures capacity, eviction policy, expiration, the
//! time source, and the optional lifecycle callbacks, then produces a
//! [`Cache`]. The bucketed front-end reuses the same configuration through
//! [`BucketedCacheBuilder`](crate::bucketed::BucketedCacheBuilder).
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use bucketcache::CacheBuilder;
//!
//! let cache = CacheBuilder::new(100)
//!     .lfu()
//!     .expiration(Duration::from_secs(60))
//!     .build()
//!     .unwrap();
//!
//! cache.set(1u64, "one".to_string()).unwrap();
//! assert_eq!(cache.get(&1).unwrap(), "one");
//! ```

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheConfig};
use crate::clock::Clock;
use crate::error::{CacheError, DynError};
use crate::policy::Engine;

/// Available eviction policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Unbounded map with expiration; ignores capacity.
    Simple,
    /// Least Recently Used.
    Lru,
    /// Least Frequently Used (frequency buckets).
    Lfu,
    /// Adaptive Replacement Cache.
    Arc,
    /// Low Inter-reference Recency Set.
    Lirs,
}

/// Builder for a single [`Cache`].
///
/// The policy defaults to LRU. Bounded policies reject capacity 0 at
/// [`build`](Self::build) time with [`CacheError::CapacityInvalid`].
pub struct CacheBuilder<K, V> {
    pub(crate) capacity: usize,
    pub(crate) policy: EvictionPolicy,
    pub(crate) config: CacheConfig<K, V>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Starts a builder for a cache holding up to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            policy: EvictionPolicy::Lru,
            config: CacheConfig::default(),
        }
    }

    /// Selects the eviction policy.
    pub fn policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Selects the SIMPLE policy (unbounded map).
    pub fn simple(self) -> Self {
        self.policy(EvictionPolicy::Simple)
    }

    /// Selects the LRU policy.
    pub fn lru(self) -> Self {
        self.policy(EvictionPolicy::Lru)
    }

    /// Selects the LFU policy.
    pub fn lfu(self) -> Self {
        self.policy(EvictionPolicy::Lfu)
    }

    /// Selects the ARC policy.
    pub fn arc(self) -> Self {
        self.policy(EvictionPolicy::Arc)
    }

    /// Selects the LIRS policy.
    pub fn lirs(self) -> Self {
        self.policy(EvictionPolicy::Lirs)
    }

    /// Default time-to-live applied to entries stored without an explicit
    /// expiration.
    pub fn expiration(mut self, ttl: Duration) -> Self {
        self.config.expiration = Some(ttl);
        self
    }

    /// Injects the time source used for expiration checks.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.config.clock = clock;
        self
    }

    /// Loader invoked on `get` misses. Concurrent misses for the same key
    /// share one invocation. The loaded value is stored with the default
    /// expiration.
    pub fn loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&K) -> Result<V, DynError> + Send + Sync + 'static,
    {
        self.config.loader = Some(Arc::new(move |key| loader(key).map(|value| (value, None))));
        self
    }

    /// Loader variant that also decides the entry's time-to-live.
    /// Supersedes [`loader`](Self::loader).
    pub fn loader_with_expire<F>(mut self, loader: F) -> Self
    where
        F: Fn(&K) -> Result<(V, Option<Duration>), DynError> + Send + Sync + 'static,
    {
        self.config.loader = Some(Arc::new(loader));
        self
    }

    /// Callback invoked after every successful insert (new or overwrite).
    pub fn added_fn<F>(mut self, hook: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.config.added_fn = Some(Arc::new(hook));
        self
    }

    /// Callback invoked when a resident entry is evicted by the policy or
    /// removed explicitly. Not called for ghost entries or lazy expiration.
    pub fn evicted_fn<F>(mut self, hook: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.config.evicted_fn = Some(Arc::new(hook));
        self
    }

    /// Callback invoked by [`Cache::purge`] once per resident entry.
    pub fn purge_visitor_fn<F>(mut self, hook: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.config.purge_visitor_fn = Some(Arc::new(hook));
        self
    }

    /// Transform applied to values on the store path. Errors abort the
    /// store and surface as [`CacheError::SerializeFailed`].
    pub fn serialize_fn<F>(mut self, transform: F) -> Self
    where
        F: Fn(&K, V) -> Result<V, DynError> + Send + Sync + 'static,
    {
        self.config.serialize_fn = Some(Arc::new(transform));
        self
    }

    /// Transform applied to values on the retrieve path. Errors surface as
    /// [`CacheError::DeserializeFailed`].
    pub fn deserialize_fn<F>(mut self, transform: F) -> Self
    where
        F: Fn(&K, V) -> Result<V, DynError> + Send + Sync + 'static,
    {
        self.config.deserialize_fn = Some(Arc::new(transform));
        self
    }

    /// Builds the cache.
    pub fn build(self) -> Result<Cache<K, V>, CacheError> {
        let engine = Engine::new(self.policy, self.capacity)?;
        Ok(Cache::from_parts(engine, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_lru() {
        let builder: CacheBuilder<u64, u64> = CacheBuilder::new(10);
        assert_eq!(builder.policy, EvictionPolicy::Lru);
    }

    #[test]
    fn bounded_policies_reject_zero_capacity() {
        for policy in [
            EvictionPolicy::Lru,
            EvictionPolicy::Lfu,
            EvictionPolicy::Arc,
            EvictionPolicy::Lirs,
        ] {
            let result = CacheBuilder::<u64, u64>::new(0).policy(policy).build();
            assert!(matches!(result, Err(CacheError::CapacityInvalid)));
        }
    }

    #[test]
    fn simple_accepts_zero_capacity() {
        let cache = CacheBuilder::<u64, u64>::new(0).simple().build().unwrap();
        cache.set(1, 1).unwrap();
        assert_eq!(cache.get(&1).unwrap(), 1);
    }

    #[test]
    fn policy_shorthands_select_policy() {
        assert_eq!(
            CacheBuilder::<u64, u64>::new(1).simple().policy,
            EvictionPolicy::Simple
        );
        assert_eq!(
            CacheBuilder::<u64, u64>::new(1).lfu().policy,
            EvictionPolicy::Lfu
        );
        assert_eq!(
            CacheBuilder::<u64, u64>::new(1).arc().policy,
            EvictionPolicy::Arc
        );
        assert_eq!(
            CacheBuilder::<u64, u64>::new(1).lirs().policy,
            EvictionPolicy::Lirs
        );
    }

    #[test]
    fn capacity_is_enforced_after_build() {
        let cache = CacheBuilder::new(2).lru().build().unwrap();
        cache.set(1, "one").unwrap();
        cache.set(2, "two").unwrap();
        cache.set(3, "three").unwrap();

        assert_eq!(cache.len(false), 2);
        assert!(!cache.has(&1));
    }
}
