//! Unbounded map policy with expiration.
//!
//! No eviction: entries stay until removed, purged, or found expired on a
//! mutating lookup. Capacity configuration is ignored.

use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::time::Instant;

use crate::policy::{Found, Inserted, Removal, ValueEntry};

pub(crate) struct SimpleEngine<K, V> {
    map: FxHashMap<K, ValueEntry<V>>,
}

impl<K, V> SimpleEngine<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            map: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Inserted<K, V> {
        let previous = self.map.insert(key, ValueEntry::new(value, expires_at));
        if previous.is_some() {
            Inserted::update()
        } else {
            Inserted::fresh(Vec::new())
        }
    }

    pub fn get(&mut self, key: &K, now: Instant) -> Found<K, V> {
        match self.map.get(key) {
            Some(entry) if entry.is_expired(now) => {
                self.map.remove(key);
                Found::miss()
            },
            Some(entry) => Found::hit(entry.value.clone()),
            None => Found::miss(),
        }
    }

    pub fn peek(&self, key: &K, now: Instant) -> Option<V> {
        self.map
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &K, now: Instant) -> bool {
        self.map
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    pub fn remove(&mut self, key: &K) -> Removal<V> {
        match self.map.remove(key) {
            Some(entry) => Removal::Resident(entry.value),
            None => Removal::Absent,
        }
    }

    pub fn keys(&self, check_expired: bool, now: Instant) -> Vec<K> {
        self.map
            .iter()
            .filter(|(_, entry)| !check_expired || !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn entries(&self, check_expired: bool, now: Instant) -> Vec<(K, V)> {
        self.map
            .iter()
            .filter(|(_, entry)| !check_expired || !entry.is_expired(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    pub fn len(&self, check_expired: bool, now: Instant) -> usize {
        if !check_expired {
            return self.map.len();
        }
        self.map
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn purge(&mut self) -> Vec<(K, V)> {
        self.map
            .drain()
            .map(|(key, entry)| (key, entry.value))
            .collect()
    }
}
