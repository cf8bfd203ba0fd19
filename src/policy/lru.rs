//! Least Recently Used replacement policy.
//!
//! One arena-backed list ordered from MRU (front) to LRU (back) plus a key
//! index. Hits and updates move the entry to the front; a full cache evicts
//! the back node. All operations are O(1).
//!
//! ```text
//!   index: FxHashMap<K, SlotId>          list: IntrusiveList<LruSlot>
//!
//!   "a" ──► id_2                front ─► [c] ◄──► [a] ◄──► [b] ◄─ back
//!   "b" ──► id_1                         MRU               LRU
//!   "c" ──► id_0                                            ▲
//!                                                    eviction victim
//! ```

use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::time::Instant;

use crate::ds::intrusive_list::IntrusiveList;
use crate::ds::slot_arena::SlotId;
use crate::policy::{Found, Inserted, Removal, ValueEntry};

struct LruSlot<K, V> {
    key: K,
    entry: ValueEntry<V>,
}

pub(crate) struct LruEngine<K, V> {
    list: IntrusiveList<LruSlot<K, V>>,
    index: FxHashMap<K, SlotId>,
    capacity: usize,
}

impl<K, V> LruEngine<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            list: IntrusiveList::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            capacity,
        }
    }

    pub fn insert(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Inserted<K, V> {
        if let Some(&id) = self.index.get(&key) {
            if let Some(slot) = self.list.get_mut(id) {
                slot.entry = ValueEntry::new(value, expires_at);
            }
            self.list.move_to_front(id);
            return Inserted::update();
        }

        let mut evicted = Vec::new();
        if self.index.len() >= self.capacity {
            if let Some(slot) = self.list.pop_back() {
                self.index.remove(&slot.key);
                evicted.push((slot.key, slot.entry.value));
            }
        }

        let id = self.list.push_front(LruSlot {
            key: key.clone(),
            entry: ValueEntry::new(value, expires_at),
        });
        self.index.insert(key, id);
        Inserted::fresh(evicted)
    }

    pub fn get(&mut self, key: &K, now: Instant) -> Found<K, V> {
        let id = match self.index.get(key) {
            Some(&id) => id,
            None => return Found::miss(),
        };
        let expired = self
            .list
            .get(id)
            .map(|slot| slot.entry.is_expired(now))
            .unwrap_or(true);
        if expired {
            self.index.remove(key);
            self.list.remove(id);
            return Found::miss();
        }
        self.list.move_to_front(id);
        let value = self.list.get(id).map(|slot| slot.entry.value.clone());
        Found {
            value,
            evicted: Vec::new(),
        }
    }

    pub fn peek(&self, key: &K, now: Instant) -> Option<V> {
        let &id = self.index.get(key)?;
        self.list
            .get(id)
            .filter(|slot| !slot.entry.is_expired(now))
            .map(|slot| slot.entry.value.clone())
    }

    pub fn contains(&self, key: &K, now: Instant) -> bool {
        match self.index.get(key) {
            Some(&id) => self
                .list
                .get(id)
                .map(|slot| !slot.entry.is_expired(now))
                .unwrap_or(false),
            None => false,
        }
    }

    pub fn remove(&mut self, key: &K) -> Removal<V> {
        match self.index.remove(key) {
            Some(id) => match self.list.remove(id) {
                Some(slot) => Removal::Resident(slot.entry.value),
                None => Removal::Absent,
            },
            None => Removal::Absent,
        }
    }

    pub fn keys(&self, check_expired: bool, now: Instant) -> Vec<K> {
        self.list
            .iter()
            .filter(|slot| !check_expired || !slot.entry.is_expired(now))
            .map(|slot| slot.key.clone())
            .collect()
    }

    pub fn entries(&self, check_expired: bool, now: Instant) -> Vec<(K, V)> {
        self.list
            .iter()
            .filter(|slot| !check_expired || !slot.entry.is_expired(now))
            .map(|slot| (slot.key.clone(), slot.entry.value.clone()))
            .collect()
    }

    pub fn len(&self, check_expired: bool, now: Instant) -> usize {
        if !check_expired {
            return self.index.len();
        }
        self.list
            .iter()
            .filter(|slot| !slot.entry.is_expired(now))
            .count()
    }

    pub fn purge(&mut self) -> Vec<(K, V)> {
        let mut drained = Vec::with_capacity(self.index.len());
        while let Some(slot) = self.list.pop_front() {
            drained.push((slot.key, slot.entry.value));
        }
        self.index.clear();
        drained
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert_eq!(self.list.len(), self.index.len());
        assert!(self.list.len() <= self.capacity);
        for slot in self.list.iter() {
            assert!(self.index.contains_key(&slot.key));
        }
        self.list.debug_validate_invariants();
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: after inserting N+1 distinct keys the first is gone and
        /// the rest are resident.
        #[test]
        fn prop_overflow_evicts_exactly_first(capacity in 1usize..32) {
            let mut engine = LruEngine::new(capacity);
            let now = Instant::now();
            for i in 0..=capacity {
                engine.insert(i, i, None);
            }

            prop_assert!(!engine.contains(&0, now));
            for i in 1..=capacity {
                prop_assert!(engine.contains(&i, now));
            }
            prop_assert_eq!(engine.len(false, now), capacity);
        }

        /// Property: resident count never exceeds capacity for any mix of
        /// inserts, gets, and removes.
        #[test]
        fn prop_len_bounded_by_capacity(
            capacity in 1usize..16,
            ops in prop::collection::vec((0u8..3, 0u32..24), 1..200)
        ) {
            let mut engine = LruEngine::new(capacity);
            let now = Instant::now();
            for (op, key) in ops {
                match op {
                    0 => {
                        engine.insert(key, key, None);
                    },
                    1 => {
                        engine.get(&key, now);
                    },
                    _ => {
                        engine.remove(&key);
                    },
                }
                prop_assert!(engine.len(false, now) <= capacity);
            }
            engine.debug_validate_invariants();
        }
    }
}
