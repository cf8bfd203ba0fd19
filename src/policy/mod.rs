//! Eviction policy engines.
//!
//! Each engine is a single-threaded policy core: a key index plus the list
//! structures its algorithm needs, storing values together with their
//! expiration instants. Engines know nothing about locking, callbacks,
//! loaders, or statistics; the lifecycle frame in [`crate::cache`] layers
//! those on top and reports engine outcomes (evictions, ghost states) to the
//! configured hooks.
//!
//! Expired entries are detected lazily: a mutating lookup that finds an
//! expired entry unlinks it from every structure and reports a miss, while
//! read-only lookups merely skip it.

pub(crate) mod arc;
pub(crate) mod lfu;
pub(crate) mod lirs;
pub(crate) mod lru;
pub(crate) mod simple;

use std::hash::Hash;
use std::time::Instant;

use crate::builder::EvictionPolicy;
use crate::error::CacheError;

use arc::ArcEngine;
use lfu::LfuEngine;
use lirs::LirsEngine;
use lru::LruEngine;
use simple::SimpleEngine;

/// Stored value plus its absolute expiration instant.
#[derive(Debug, Clone)]
pub(crate) struct ValueEntry<V> {
    pub value: V,
    pub expires_at: Option<Instant>,
}

impl<V> ValueEntry<V> {
    pub fn new(value: V, expires_at: Option<Instant>) -> Self {
        Self { value, expires_at }
    }

    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(at) => now > at,
            None => false,
        }
    }
}

/// Outcome of an engine insert.
pub(crate) struct Inserted<K, V> {
    /// The key was already present and its value was replaced.
    pub updated: bool,
    /// Resident entries displaced to make room, in eviction order.
    pub evicted: Vec<(K, V)>,
}

impl<K, V> Inserted<K, V> {
    pub fn fresh(evicted: Vec<(K, V)>) -> Self {
        Self {
            updated: false,
            evicted,
        }
    }

    pub fn update() -> Self {
        Self {
            updated: true,
            evicted: Vec::new(),
        }
    }
}

/// Outcome of a mutating engine lookup.
///
/// A hit can displace residents (LIRS promotes a hot HIR entry to LIR,
/// which may push a queue victim out), so evictions ride along.
pub(crate) struct Found<K, V> {
    pub value: Option<V>,
    pub evicted: Vec<(K, V)>,
}

impl<K, V> Found<K, V> {
    pub fn miss() -> Self {
        Self {
            value: None,
            evicted: Vec::new(),
        }
    }

    pub fn hit(value: V) -> Self {
        Self {
            value: Some(value),
            evicted: Vec::new(),
        }
    }
}

/// What an engine-level remove found for the key.
pub(crate) enum Removal<V> {
    /// The key was not tracked at all.
    Absent,
    /// The key was tracked without a value (LIRS non-resident entry).
    Ghost,
    /// A resident entry was removed; the value is handed back for hooks.
    Resident(V),
}

impl<V> Removal<V> {
    pub fn was_present(&self) -> bool {
        !matches!(self, Removal::Absent)
    }
}

/// Closed set of policy engines selected at construction time.
pub(crate) enum Engine<K, V> {
    Simple(SimpleEngine<K, V>),
    Lru(LruEngine<K, V>),
    Lfu(LfuEngine<K, V>),
    Arc(ArcEngine<K, V>),
    Lirs(LirsEngine<K, V>),
}

impl<K, V> Engine<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Builds the engine for `policy`; bounded policies reject capacity 0.
    pub fn new(policy: EvictionPolicy, capacity: usize) -> Result<Self, CacheError> {
        if capacity == 0 && policy != EvictionPolicy::Simple {
            return Err(CacheError::CapacityInvalid);
        }
        Ok(match policy {
            EvictionPolicy::Simple => Engine::Simple(SimpleEngine::new()),
            EvictionPolicy::Lru => Engine::Lru(LruEngine::new(capacity)),
            EvictionPolicy::Lfu => Engine::Lfu(LfuEngine::new(capacity)),
            EvictionPolicy::Arc => Engine::Arc(ArcEngine::new(capacity)),
            EvictionPolicy::Lirs => Engine::Lirs(LirsEngine::new(capacity)),
        })
    }

    pub fn insert(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Inserted<K, V> {
        match self {
            Engine::Simple(engine) => engine.insert(key, value, expires_at),
            Engine::Lru(engine) => engine.insert(key, value, expires_at),
            Engine::Lfu(engine) => engine.insert(key, value, expires_at),
            Engine::Arc(engine) => engine.insert(key, value, expires_at),
            Engine::Lirs(engine) => engine.insert(key, value, expires_at),
        }
    }

    pub fn get(&mut self, key: &K, now: Instant) -> Found<K, V> {
        match self {
            Engine::Simple(engine) => engine.get(key, now),
            Engine::Lru(engine) => engine.get(key, now),
            Engine::Lfu(engine) => engine.get(key, now),
            Engine::Arc(engine) => engine.get(key, now),
            Engine::Lirs(engine) => engine.get(key, now),
        }
    }

    pub fn peek(&self, key: &K, now: Instant) -> Option<V> {
        match self {
            Engine::Simple(engine) => engine.peek(key, now),
            Engine::Lru(engine) => engine.peek(key, now),
            Engine::Lfu(engine) => engine.peek(key, now),
            Engine::Arc(engine) => engine.peek(key, now),
            Engine::Lirs(engine) => engine.peek(key, now),
        }
    }

    pub fn contains(&self, key: &K, now: Instant) -> bool {
        match self {
            Engine::Simple(engine) => engine.contains(key, now),
            Engine::Lru(engine) => engine.contains(key, now),
            Engine::Lfu(engine) => engine.contains(key, now),
            Engine::Arc(engine) => engine.contains(key, now),
            Engine::Lirs(engine) => engine.contains(key, now),
        }
    }

    pub fn remove(&mut self, key: &K) -> Removal<V> {
        match self {
            Engine::Simple(engine) => engine.remove(key),
            Engine::Lru(engine) => engine.remove(key),
            Engine::Lfu(engine) => engine.remove(key),
            Engine::Arc(engine) => engine.remove(key),
            Engine::Lirs(engine) => engine.remove(key),
        }
    }

    pub fn keys(&self, check_expired: bool, now: Instant) -> Vec<K> {
        match self {
            Engine::Simple(engine) => engine.keys(check_expired, now),
            Engine::Lru(engine) => engine.keys(check_expired, now),
            Engine::Lfu(engine) => engine.keys(check_expired, now),
            Engine::Arc(engine) => engine.keys(check_expired, now),
            Engine::Lirs(engine) => engine.keys(check_expired, now),
        }
    }

    pub fn entries(&self, check_expired: bool, now: Instant) -> Vec<(K, V)> {
        match self {
            Engine::Simple(engine) => engine.entries(check_expired, now),
            Engine::Lru(engine) => engine.entries(check_expired, now),
            Engine::Lfu(engine) => engine.entries(check_expired, now),
            Engine::Arc(engine) => engine.entries(check_expired, now),
            Engine::Lirs(engine) => engine.entries(check_expired, now),
        }
    }

    pub fn len(&self, check_expired: bool, now: Instant) -> usize {
        match self {
            Engine::Simple(engine) => engine.len(check_expired, now),
            Engine::Lru(engine) => engine.len(check_expired, now),
            Engine::Lfu(engine) => engine.len(check_expired, now),
            Engine::Arc(engine) => engine.len(check_expired, now),
            Engine::Lirs(engine) => engine.len(check_expired, now),
        }
    }

    /// Drains every resident entry, returning them for the purge visitor.
    pub fn purge(&mut self) -> Vec<(K, V)> {
        match self {
            Engine::Simple(engine) => engine.purge(),
            Engine::Lru(engine) => engine.purge(),
            Engine::Lfu(engine) => engine.purge(),
            Engine::Arc(engine) => engine.purge(),
            Engine::Lirs(engine) => engine.purge(),
        }
    }
}
