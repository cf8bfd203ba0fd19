//! Bounded recency list of keys without values.
//!
//! The ARC engine tracks recently evicted keys in two of these lists (B1 and
//! B2). A hit on a ghost key signals that the entry should have been kept,
//! which drives the adaptation parameter.
//!
//! Backed by an [`IntrusiveList`] of keys plus an `FxHashMap` index for O(1)
//! membership checks. Front is the most recently recorded key; the back is
//! dropped first.

use rustc_hash::FxHashMap;
use std::hash::Hash;

use crate::ds::intrusive_list::IntrusiveList;
use crate::ds::slot_arena::SlotId;

/// Bounded key-only recency list for ghost tracking.
///
/// # Example
///
/// ```
/// use bucketcache::ds::GhostList;
///
/// let mut ghost = GhostList::new(2);
/// ghost.record("a");
/// ghost.record("b");
///
/// // At capacity the least recent key is dropped.
/// ghost.record("c");
/// assert!(!ghost.contains(&"a"));
/// assert!(ghost.contains(&"b"));
/// assert!(ghost.contains(&"c"));
/// ```
#[derive(Debug)]
pub struct GhostList<K> {
    list: IntrusiveList<K>,
    index: FxHashMap<K, SlotId>,
    capacity: usize,
}

impl<K> GhostList<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates a ghost list holding at most `capacity` keys.
    ///
    /// A capacity of 0 makes `record` a no-op.
    pub fn new(capacity: usize) -> Self {
        Self {
            list: IntrusiveList::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            capacity,
        }
    }

    /// Returns the number of keys tracked.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Returns `true` if no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Returns `true` if `key` is tracked (a ghost hit).
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Records `key` as most recently seen, dropping the least recent key
    /// if the list is at capacity. Re-recording promotes to the front.
    pub fn record(&mut self, key: K) {
        if self.capacity == 0 {
            return;
        }
        if let Some(&id) = self.index.get(&key) {
            self.list.move_to_front(id);
            return;
        }
        if self.list.len() >= self.capacity {
            self.pop_oldest();
        }
        let id = self.list.push_front(key.clone());
        self.index.insert(key, id);
    }

    /// Removes `key`; returns `true` if it was tracked.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.index.remove(key) {
            Some(id) => {
                self.list.remove(id);
                true
            },
            None => false,
        }
    }

    /// Drops and returns the least recently recorded key.
    pub fn pop_oldest(&mut self) -> Option<K> {
        let key = self.list.pop_back()?;
        self.index.remove(&key);
        Some(key)
    }

    /// Removes all keys.
    pub fn clear(&mut self) {
        self.list.clear();
        self.index.clear();
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert_eq!(self.list.len(), self.index.len());
        assert!(self.list.len() <= self.capacity);
        for key in self.list.iter() {
            assert!(self.index.contains_key(key));
        }
        self.list.debug_validate_invariants();
    }
}
