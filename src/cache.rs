//! Lifecycle frame shared by every policy engine.
//!
//! [`Cache`] wraps one policy engine behind a `parking_lot::RwLock` and
//! layers the entry lifecycle on top: expiration stamping, the optional
//! serialize/deserialize boundary, added/evicted/purge callbacks, loader
//! dispatch with single-flight coalescing, and hit/miss statistics.
//!
//! ```text
//!   get(key)
//!     │  write lock ──► engine.get ── hit ──► deserialize ──► value
//!     │                    │
//!     │                   miss (counted)
//!     │                    │ lock released
//!     ▼                    ▼
//!   loader configured? ── LoadGroup.begin
//!        owner: run loader ──► store ──► broadcast result
//!        joined: wait for the owner's broadcast
//! ```
//!
//! Locking: `peek`, `has`, `len`, `keys`, and `get_all` take the read lock;
//! `get` mutates recency state and takes the write lock like the other
//! mutating operations. Loaders run with no engine lock held. Hooks run
//! with the engine lock held and must not call back into the same cache.

use parking_lot::RwLock;
use std::hash::Hash;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::clock::{Clock, RealClock};
use crate::error::{CacheError, DynError};
use crate::loader::{Flight, LoadGroup};
use crate::policy::{Engine, Removal};
use crate::stats::{CacheStats, StatsSnapshot};

pub(crate) type EntryHook<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;
pub(crate) type TransformFn<K, V> = Arc<dyn Fn(&K, V) -> Result<V, DynError> + Send + Sync>;
pub(crate) type LoaderFn<K, V> =
    Arc<dyn Fn(&K) -> Result<(V, Option<Duration>), DynError> + Send + Sync>;

/// Hooks, clock, and expiration settings shared by a cache and its buckets.
pub(crate) struct CacheConfig<K, V> {
    pub clock: Arc<dyn Clock>,
    pub expiration: Option<Duration>,
    pub loader: Option<LoaderFn<K, V>>,
    pub added_fn: Option<EntryHook<K, V>>,
    pub evicted_fn: Option<EntryHook<K, V>>,
    pub purge_visitor_fn: Option<EntryHook<K, V>>,
    pub serialize_fn: Option<TransformFn<K, V>>,
    pub deserialize_fn: Option<TransformFn<K, V>>,
}

impl<K, V> Default for CacheConfig<K, V> {
    fn default() -> Self {
        Self {
            clock: Arc::new(RealClock::new()),
            expiration: None,
            loader: None,
            added_fn: None,
            evicted_fn: None,
            purge_visitor_fn: None,
            serialize_fn: None,
            deserialize_fn: None,
        }
    }
}

impl<K, V> Clone for CacheConfig<K, V> {
    fn clone(&self) -> Self {
        Self {
            clock: Arc::clone(&self.clock),
            expiration: self.expiration,
            loader: self.loader.clone(),
            added_fn: self.added_fn.clone(),
            evicted_fn: self.evicted_fn.clone(),
            purge_visitor_fn: self.purge_visitor_fn.clone(),
            serialize_fn: self.serialize_fn.clone(),
            deserialize_fn: self.deserialize_fn.clone(),
        }
    }
}

/// Engine-level lookup result carrying its origin for statistics.
pub(crate) struct Lookup<V> {
    pub value: V,
    pub from_cache: bool,
}

struct CacheShared<K, V> {
    engine: RwLock<Engine<K, V>>,
    config: CacheConfig<K, V>,
    load_group: LoadGroup<K, V>,
    stats: CacheStats,
}

/// A cache over one policy engine.
///
/// Cheaply cloneable; clones share the same engine and statistics. Build
/// instances through [`CacheBuilder`](crate::builder::CacheBuilder).
///
/// # Example
///
/// ```
/// use bucketcache::{CacheBuilder, EvictionPolicy};
///
/// let cache = CacheBuilder::new(100)
///     .policy(EvictionPolicy::Lru)
///     .build()
///     .unwrap();
///
/// cache.set("key", "value").unwrap();
/// assert_eq!(cache.get(&"key").unwrap(), "value");
/// assert!(cache.get(&"missing").is_err());
/// ```
pub struct Cache<K, V> {
    shared: Arc<CacheShared<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_parts(engine: Engine<K, V>, config: CacheConfig<K, V>) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                engine: RwLock::new(engine),
                config,
                load_group: LoadGroup::new(),
                stats: CacheStats::new(),
            }),
        }
    }

    /// Inserts or updates `key`, applying the default expiration if one is
    /// configured. May evict an entry from a full cache.
    pub fn set(&self, key: K, value: V) -> Result<(), CacheError> {
        self.shared.store(key, value, None)
    }

    /// Inserts or updates `key` with a per-entry time-to-live that
    /// overrides the default expiration.
    pub fn set_with_expire(&self, key: K, value: V, ttl: Duration) -> Result<(), CacheError> {
        self.shared.store(key, value, Some(ttl))
    }

    /// Returns the resident, non-expired value for `key`, updating the
    /// policy state. On a miss with a loader configured the caller blocks
    /// on the (possibly shared) load and receives its result.
    pub fn get(&self, key: &K) -> Result<V, CacheError> {
        self.lookup(key, true).map(|lookup| lookup.value)
    }

    /// Like [`get`](Self::get) but never waits for a loader: a miss starts
    /// the load in the background and reports `KeyNotFound` immediately.
    pub fn get_if_present(&self, key: &K) -> Result<V, CacheError> {
        self.lookup(key, false).map(|lookup| lookup.value)
    }

    pub(crate) fn lookup(&self, key: &K, wait: bool) -> Result<Lookup<V>, CacheError> {
        let now = self.shared.config.clock.now();
        let hit = {
            let mut engine = self.shared.engine.write();
            let found = engine.get(key, now);
            self.shared.notify_evicted(&found.evicted);
            found.value
        };

        if let Some(stored) = hit {
            self.shared.stats.record_hit();
            let value = self.shared.deserialize(key, stored)?;
            return Ok(Lookup {
                value,
                from_cache: true,
            });
        }

        self.shared.stats.record_miss();
        if self.shared.config.loader.is_none() {
            return Err(CacheError::KeyNotFound);
        }
        let value = CacheShared::load(&self.shared, key, wait)?;
        Ok(Lookup {
            value,
            from_cache: false,
        })
    }

    /// Returns the value without touching policy state or statistics.
    pub fn peek(&self, key: &K) -> Result<V, CacheError> {
        let now = self.shared.config.clock.now();
        let stored = self.shared.engine.read().peek(key, now);
        match stored {
            Some(value) => self.shared.deserialize(key, value),
            None => Err(CacheError::KeyNotFound),
        }
    }

    /// Returns `true` if `key` is resident and not expired. Does not touch
    /// policy state.
    pub fn has(&self, key: &K) -> bool {
        let now = self.shared.config.clock.now();
        self.shared.engine.read().contains(key, now)
    }

    /// Removes `key` unconditionally; returns whether it was tracked.
    /// The eviction callback fires for resident entries only.
    pub fn remove(&self, key: &K) -> bool {
        let mut engine = self.shared.engine.write();
        match engine.remove(key) {
            Removal::Resident(value) => {
                if let Some(hook) = &self.shared.config.evicted_fn {
                    hook(key, &value);
                }
                true
            },
            removal => removal.was_present(),
        }
    }

    /// Snapshot of resident keys. With `check_expired`, expired entries
    /// are excluded.
    pub fn keys(&self, check_expired: bool) -> Vec<K> {
        let now = self.shared.config.clock.now();
        self.shared.engine.read().keys(check_expired, now)
    }

    /// Snapshot of resident entries as raw stored values (the serialize
    /// transform is not reversed here).
    pub fn get_all(&self, check_expired: bool) -> Vec<(K, V)> {
        let now = self.shared.config.clock.now();
        self.shared.engine.read().entries(check_expired, now)
    }

    /// Number of resident entries; with `check_expired`, expired entries
    /// are excluded.
    pub fn len(&self, check_expired: bool) -> usize {
        let now = self.shared.config.clock.now();
        self.shared.engine.read().len(check_expired, now)
    }

    /// Returns `true` if the cache holds no resident entries.
    pub fn is_empty(&self) -> bool {
        self.len(false) == 0
    }

    /// Removes every entry. The purge visitor, when configured, sees each
    /// resident entry before the cache empties.
    pub fn purge(&self) {
        let mut engine = self.shared.engine.write();
        let drained = engine.purge();
        if let Some(visitor) = &self.shared.config.purge_visitor_fn {
            for (key, value) in &drained {
                visitor(key, value);
            }
        }
    }

    /// Lookups answered from cache.
    pub fn hit_count(&self) -> u64 {
        self.shared.stats.hit_count()
    }

    /// Lookups that missed (loader-resolved lookups included).
    pub fn miss_count(&self) -> u64 {
        self.shared.stats.miss_count()
    }

    /// Total lookups.
    pub fn lookup_count(&self) -> u64 {
        self.shared.stats.lookup_count()
    }

    /// Fraction of lookups answered from cache.
    pub fn hit_rate(&self) -> f64 {
        self.shared.stats.hit_rate()
    }

    /// Point-in-time copy of this cache's counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl<K, V> CacheShared<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn store(&self, key: K, value: V, ttl: Option<Duration>) -> Result<(), CacheError> {
        let stored = self.serialize(&key, value)?;
        let now = self.config.clock.now();
        let expires_at = ttl.or(self.config.expiration).map(|d| now + d);

        let mut engine = self.engine.write();
        let hook_pair = self
            .config
            .added_fn
            .as_ref()
            .map(|_| (key.clone(), stored.clone()));
        let outcome = engine.insert(key, stored, expires_at);
        self.notify_evicted(&outcome.evicted);
        if let Some(hook) = &self.config.added_fn {
            if let Some((key, value)) = hook_pair {
                hook(&key, &value);
            }
        }
        Ok(())
    }

    fn notify_evicted(&self, evicted: &[(K, V)]) {
        if let Some(hook) = &self.config.evicted_fn {
            for (key, value) in evicted {
                hook(key, value);
            }
        }
    }

    fn serialize(&self, key: &K, value: V) -> Result<V, CacheError> {
        match &self.config.serialize_fn {
            Some(transform) => transform(key, value).map_err(CacheError::serialize_failed),
            None => Ok(value),
        }
    }

    fn deserialize(&self, key: &K, value: V) -> Result<V, CacheError> {
        match &self.config.deserialize_fn {
            Some(transform) => transform(key, value).map_err(CacheError::deserialize_failed),
            None => Ok(value),
        }
    }

    /// Resolves a miss through the single-flight group.
    fn load(shared: &Arc<Self>, key: &K, wait: bool) -> Result<V, CacheError> {
        match shared.load_group.begin(key) {
            Flight::Joined(call) => {
                if !wait {
                    return Err(CacheError::KeyNotFound);
                }
                call.wait()
            },
            Flight::Owner(call) => {
                if wait {
                    let result = Self::run_loader(shared, key);
                    shared.load_group.finish(key, &call, result.clone());
                    result
                } else {
                    let shared = Arc::clone(shared);
                    let key = key.clone();
                    thread::spawn(move || {
                        let result = Self::run_loader(&shared, &key);
                        shared.load_group.finish(&key, &call, result);
                    });
                    Err(CacheError::KeyNotFound)
                }
            },
        }
    }

    /// Runs the loader with no engine lock held and stores its result.
    /// A failed load leaves the cache untouched.
    fn run_loader(shared: &Arc<Self>, key: &K) -> Result<V, CacheError> {
        let loader = match &shared.config.loader {
            Some(loader) => Arc::clone(loader),
            None => return Err(CacheError::KeyNotFound),
        };
        match loader(key) {
            Ok((value, ttl)) => {
                shared.store(key.clone(), value.clone(), ttl)?;
                Ok(value)
            },
            Err(cause) => Err(CacheError::loader_failed(cause)),
        }
    }
}
