//! Adaptive Replacement Cache policy.
//!
//! Four lists over one key space, with a self-tuning target for the recency
//! side:
//!
//! ```text
//!   T1 (recent once, resident)         T2 (frequent, resident)
//!   ┌─────────────────────────┐        ┌─────────────────────────┐
//!   │ MRU ──► ... ──► LRU     │        │ MRU ──► ... ──► LRU     │
//!   └───────────────────┬─────┘        └───────────────────┬─────┘
//!                       │ evict                            │ evict
//!                       ▼                                  ▼
//!   B1 (ghost keys of T1)               B2 (ghost keys of T2)
//!
//!   p: target size of T1, clamped to [0, capacity]
//!     hit in B1 ─► grow p (favor recency)
//!     hit in B2 ─► shrink p (favor frequency)
//! ```
//!
//! Any hit on a resident entry moves it to the MRU end of T2. Re-inserting
//! a ghost key adapts `p`, makes room with the replace rule, and revives
//! the key straight into T2. Ghost keys carry no value: they are invisible
//! to `len`, `keys`, `entries`, and the eviction callback.
//!
//! Reference: Megiddo & Modha, "ARC: A Self-Tuning, Low Overhead
//! Replacement Cache", FAST 2003.

use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::time::Instant;

use crate::ds::ghost_list::GhostList;
use crate::ds::intrusive_list::IntrusiveList;
use crate::ds::slot_arena::SlotId;
use crate::policy::{Found, Inserted, Removal, ValueEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResidentList {
    T1,
    T2,
}

struct ArcSlot<K, V> {
    key: K,
    entry: ValueEntry<V>,
}

pub(crate) struct ArcEngine<K, V> {
    t1: IntrusiveList<ArcSlot<K, V>>,
    t2: IntrusiveList<ArcSlot<K, V>>,
    b1: GhostList<K>,
    b2: GhostList<K>,
    index: FxHashMap<K, (ResidentList, SlotId)>,
    /// Adaptation parameter: target size for T1.
    p: usize,
    capacity: usize,
}

impl<K, V> ArcEngine<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            t1: IntrusiveList::with_capacity(capacity),
            t2: IntrusiveList::with_capacity(capacity),
            b1: GhostList::new(capacity),
            b2: GhostList::new(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            p: 0,
            capacity,
        }
    }

    pub fn insert(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Inserted<K, V> {
        if self.capacity == 0 {
            return Inserted::fresh(Vec::new());
        }

        // Resident hit: replace the value and promote to T2.
        if let Some(&(list, id)) = self.index.get(&key) {
            let new_entry = ValueEntry::new(value, expires_at);
            match list {
                ResidentList::T1 => {
                    if let Some(mut slot) = self.t1.remove(id) {
                        slot.entry = new_entry;
                        let nid = self.t2.push_front(slot);
                        self.index.insert(key, (ResidentList::T2, nid));
                    }
                },
                ResidentList::T2 => {
                    if let Some(slot) = self.t2.get_mut(id) {
                        slot.entry = new_entry;
                    }
                    self.t2.move_to_front(id);
                },
            }
            return Inserted::update();
        }

        let mut evicted = Vec::new();

        // Ghost hit in B1: the recency side was too small.
        if self.b1.contains(&key) {
            self.adapt_on_b1_hit();
            self.b1.remove(&key);
            if let Some(pair) = self.replace(false) {
                evicted.push(pair);
            }
            let id = self.t2.push_front(ArcSlot {
                key: key.clone(),
                entry: ValueEntry::new(value, expires_at),
            });
            self.index.insert(key, (ResidentList::T2, id));
            return Inserted::fresh(evicted);
        }

        // Ghost hit in B2: the frequency side was too small.
        if self.b2.contains(&key) {
            self.adapt_on_b2_hit();
            self.b2.remove(&key);
            if let Some(pair) = self.replace(true) {
                evicted.push(pair);
            }
            let id = self.t2.push_front(ArcSlot {
                key: key.clone(),
                entry: ValueEntry::new(value, expires_at),
            });
            self.index.insert(key, (ResidentList::T2, id));
            return Inserted::fresh(evicted);
        }

        // True miss.
        let l1 = self.t1.len() + self.b1.len();
        if l1 >= self.capacity {
            if self.t1.len() < self.capacity {
                // B1 is crowding L1: forget its oldest ghost, then make room.
                self.b1.pop_oldest();
                if let Some(pair) = self.replace(false) {
                    evicted.push(pair);
                }
            } else {
                // T1 alone fills the cache: retire its LRU to the ghost list
                // so a quick re-reference can still adapt p.
                let total = l1 + self.t2.len() + self.b2.len();
                if total >= 2 * self.capacity {
                    if !self.b2.is_empty() {
                        self.b2.pop_oldest();
                    } else {
                        self.b1.pop_oldest();
                    }
                }
                if let Some(slot) = self.t1.pop_back() {
                    self.index.remove(&slot.key);
                    self.b1.record(slot.key.clone());
                    evicted.push((slot.key, slot.entry.value));
                }
            }
        } else {
            let total = l1 + self.t2.len() + self.b2.len();
            if total >= self.capacity {
                if total >= 2 * self.capacity {
                    if !self.b2.is_empty() {
                        self.b2.pop_oldest();
                    } else {
                        self.b1.pop_oldest();
                    }
                }
                if let Some(pair) = self.replace(false) {
                    evicted.push(pair);
                }
            }
        }

        let id = self.t1.push_front(ArcSlot {
            key: key.clone(),
            entry: ValueEntry::new(value, expires_at),
        });
        self.index.insert(key, (ResidentList::T1, id));
        Inserted::fresh(evicted)
    }

    pub fn get(&mut self, key: &K, now: Instant) -> Found<K, V> {
        let (list, id) = match self.index.get(key) {
            Some(&pair) => pair,
            None => return Found::miss(),
        };

        let expired = match list {
            ResidentList::T1 => self.t1.get(id),
            ResidentList::T2 => self.t2.get(id),
        }
        .map(|slot| slot.entry.is_expired(now))
        .unwrap_or(true);
        if expired {
            self.discard(key, list, id);
            return Found::miss();
        }

        match list {
            ResidentList::T1 => {
                if let Some(slot) = self.t1.remove(id) {
                    let value = slot.entry.value.clone();
                    let nid = self.t2.push_front(slot);
                    self.index.insert(key.clone(), (ResidentList::T2, nid));
                    return Found::hit(value);
                }
                Found::miss()
            },
            ResidentList::T2 => {
                self.t2.move_to_front(id);
                match self.t2.get(id) {
                    Some(slot) => Found::hit(slot.entry.value.clone()),
                    None => Found::miss(),
                }
            },
        }
    }

    pub fn peek(&self, key: &K, now: Instant) -> Option<V> {
        let &(list, id) = self.index.get(key)?;
        let slot = match list {
            ResidentList::T1 => self.t1.get(id),
            ResidentList::T2 => self.t2.get(id),
        }?;
        if slot.entry.is_expired(now) {
            return None;
        }
        Some(slot.entry.value.clone())
    }

    pub fn contains(&self, key: &K, now: Instant) -> bool {
        match self.index.get(key) {
            Some(&(list, id)) => {
                let slot = match list {
                    ResidentList::T1 => self.t1.get(id),
                    ResidentList::T2 => self.t2.get(id),
                };
                slot.map(|s| !s.entry.is_expired(now)).unwrap_or(false)
            },
            None => false,
        }
    }

    pub fn remove(&mut self, key: &K) -> Removal<V> {
        match self.index.remove(key) {
            Some((list, id)) => {
                let slot = match list {
                    ResidentList::T1 => self.t1.remove(id),
                    ResidentList::T2 => self.t2.remove(id),
                };
                match slot {
                    Some(slot) => Removal::Resident(slot.entry.value),
                    None => Removal::Absent,
                }
            },
            None => Removal::Absent,
        }
    }

    pub fn keys(&self, check_expired: bool, now: Instant) -> Vec<K> {
        self.resident_iter()
            .filter(|slot| !check_expired || !slot.entry.is_expired(now))
            .map(|slot| slot.key.clone())
            .collect()
    }

    pub fn entries(&self, check_expired: bool, now: Instant) -> Vec<(K, V)> {
        self.resident_iter()
            .filter(|slot| !check_expired || !slot.entry.is_expired(now))
            .map(|slot| (slot.key.clone(), slot.entry.value.clone()))
            .collect()
    }

    pub fn len(&self, check_expired: bool, now: Instant) -> usize {
        if !check_expired {
            return self.t1.len() + self.t2.len();
        }
        self.resident_iter()
            .filter(|slot| !slot.entry.is_expired(now))
            .count()
    }

    pub fn purge(&mut self) -> Vec<(K, V)> {
        let mut drained = Vec::with_capacity(self.t1.len() + self.t2.len());
        while let Some(slot) = self.t1.pop_front() {
            drained.push((slot.key, slot.entry.value));
        }
        while let Some(slot) = self.t2.pop_front() {
            drained.push((slot.key, slot.entry.value));
        }
        self.b1.clear();
        self.b2.clear();
        self.index.clear();
        self.p = 0;
        drained
    }

    fn resident_iter(&self) -> impl Iterator<Item = &ArcSlot<K, V>> {
        self.t1.iter().chain(self.t2.iter())
    }

    /// Selects a victim from T1 or T2 and demotes it to the matching ghost
    /// list. No-op while the cache is not full.
    fn replace(&mut self, in_b2: bool) -> Option<(K, V)> {
        if self.t1.len() + self.t2.len() < self.capacity {
            return None;
        }
        let mut from_t1 = !self.t1.is_empty()
            && (self.t1.len() > self.p || (in_b2 && self.t1.len() == self.p));
        if !from_t1 && self.t2.is_empty() {
            from_t1 = !self.t1.is_empty();
        }

        if from_t1 {
            let slot = self.t1.pop_back()?;
            self.index.remove(&slot.key);
            self.b1.record(slot.key.clone());
            Some((slot.key, slot.entry.value))
        } else {
            let slot = self.t2.pop_back()?;
            self.index.remove(&slot.key);
            self.b2.record(slot.key.clone());
            Some((slot.key, slot.entry.value))
        }
    }

    fn adapt_on_b1_hit(&mut self) {
        let delta = if self.b1.len() >= self.b2.len() {
            1
        } else {
            (self.b2.len() / self.b1.len()).max(1)
        };
        self.p = (self.p + delta).min(self.capacity);
    }

    fn adapt_on_b2_hit(&mut self) {
        let delta = if self.b2.len() >= self.b1.len() {
            1
        } else {
            (self.b1.len() / self.b2.len()).max(1)
        };
        self.p = self.p.saturating_sub(delta);
    }

    /// Drops an expired entry without recording a ghost.
    fn discard(&mut self, key: &K, list: ResidentList, id: SlotId) {
        self.index.remove(key);
        match list {
            ResidentList::T1 => {
                self.t1.remove(id);
            },
            ResidentList::T2 => {
                self.t2.remove(id);
            },
        }
    }

    #[cfg(any(test, debug_assertions))]
    pub fn p_value(&self) -> usize {
        self.p
    }

    #[cfg(any(test, debug_assertions))]
    pub fn t2_contains(&self, key: &K) -> bool {
        matches!(self.index.get(key), Some(&(ResidentList::T2, _)))
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert_eq!(self.index.len(), self.t1.len() + self.t2.len());
        assert!(self.t1.len() + self.t2.len() <= self.capacity);
        assert!(
            self.t1.len() + self.t2.len() + self.b1.len() + self.b2.len() <= 2 * self.capacity
        );
        assert!(self.p <= self.capacity);

        for slot in self.t1.iter() {
            assert!(matches!(
                self.index.get(&slot.key),
                Some(&(ResidentList::T1, _))
            ));
            assert!(!self.b1.contains(&slot.key));
            assert!(!self.b2.contains(&slot.key));
        }
        for slot in self.t2.iter() {
            assert!(matches!(
                self.index.get(&slot.key),
                Some(&(ResidentList::T2, _))
            ));
            assert!(!self.b1.contains(&slot.key));
            assert!(!self.b2.contains(&slot.key));
        }
        self.t1.debug_validate_invariants();
        self.t2.debug_validate_invariants();
        self.b1.debug_validate_invariants();
        self.b2.debug_validate_invariants();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn now() -> Instant {
        Instant::now()
    }

    #[test]
    fn arc_insert_lands_in_t1_hit_promotes_to_t2() {
        let mut engine = ArcEngine::new(10);
        engine.insert("k", 1, None);
        assert_eq!(engine.t1.len(), 1);
        assert_eq!(engine.t2.len(), 0);

        assert_eq!(engine.get(&"k", now()).value, Some(1));
        assert_eq!(engine.t1.len(), 0);
        assert_eq!(engine.t2.len(), 1);

        // A second hit keeps it in T2.
        engine.get(&"k", now());
        assert_eq!(engine.t2.len(), 1);
        engine.debug_validate_invariants();
    }

    #[test]
    fn arc_eviction_records_ghost() {
        let mut engine = ArcEngine::new(2);
        engine.insert("a", 1, None);
        engine.insert("b", 2, None);

        let outcome = engine.insert("c", 3, None);
        assert_eq!(outcome.evicted, vec![("a", 1)]);
        assert!(engine.b1.contains(&"a"));
        assert!(!engine.contains(&"a", now()));
        engine.debug_validate_invariants();
    }

    #[test]
    fn arc_ghost_hit_revives_into_t2_and_grows_p() {
        let mut engine = ArcEngine::new(2);
        engine.insert("a", 1, None);
        engine.insert("b", 2, None);
        engine.insert("c", 3, None); // evicts "a" into B1
        let p_before = engine.p_value();

        engine.insert("a", 10, None); // ghost hit
        assert!(engine.t2_contains(&"a"));
        assert!(engine.p_value() > p_before);
        assert!(!engine.b1.contains(&"a"));
        assert_eq!(engine.len(false, now()), 2);
        engine.debug_validate_invariants();
    }

    #[test]
    fn arc_b2_hit_shrinks_p() {
        let mut engine = ArcEngine::new(2);
        engine.insert("a", 1, None);
        engine.insert("b", 2, None);
        engine.get(&"a", now());
        engine.get(&"b", now()); // both now in T2

        engine.insert("c", 3, None); // evicts T2 LRU "a" into B2
        assert!(engine.b2.contains(&"a"));

        engine.insert("d", 4, None); // evicts T1 LRU "c" into B1
        engine.insert("a", 10, None); // B2 ghost hit keeps p pinned at 0
        assert!(engine.t2_contains(&"a"));
        assert_eq!(engine.p_value(), 0);
        engine.debug_validate_invariants();
    }

    #[test]
    fn arc_update_promotes_to_t2() {
        let mut engine = ArcEngine::new(4);
        engine.insert("k", 1, None);
        let outcome = engine.insert("k", 2, None);

        assert!(outcome.updated);
        assert!(engine.t2_contains(&"k"));
        assert_eq!(engine.get(&"k", now()).value, Some(2));
    }

    #[test]
    fn arc_resident_never_exceeds_capacity() {
        let mut engine = ArcEngine::new(4);
        for i in 0..32 {
            engine.insert(i, i, None);
            if i % 3 == 0 {
                engine.get(&(i / 2), now());
            }
            assert!(engine.len(false, now()) <= 4);
            engine.debug_validate_invariants();
        }
    }

    #[test]
    fn arc_remove_does_not_create_ghost() {
        let mut engine = ArcEngine::new(4);
        engine.insert("k", 1, None);

        assert!(matches!(engine.remove(&"k"), Removal::Resident(1)));
        assert!(!engine.b1.contains(&"k"));
        assert!(matches!(engine.remove(&"k"), Removal::Absent));
        engine.debug_validate_invariants();
    }

    #[test]
    fn arc_expired_entry_misses_without_ghost() {
        let mut engine = ArcEngine::new(4);
        let start = now();
        engine.insert("k", 1, Some(start + Duration::from_millis(5)));

        let later = start + Duration::from_millis(10);
        assert!(engine.get(&"k", later).value.is_none());
        assert!(!engine.b1.contains(&"k"));
        assert_eq!(engine.len(false, later), 0);
        engine.debug_validate_invariants();
    }

    #[test]
    fn arc_ghosts_are_invisible_to_views() {
        let mut engine = ArcEngine::new(2);
        engine.insert("a", 1, None);
        engine.insert("b", 2, None);
        engine.insert("c", 3, None); // "a" becomes a ghost

        let keys = engine.keys(false, now());
        assert_eq!(keys.len(), 2);
        assert!(!keys.contains(&"a"));
        assert_eq!(engine.len(false, now()), 2);
        assert_eq!(engine.entries(false, now()).len(), 2);
    }

    #[test]
    fn arc_purge_clears_all_lists() {
        let mut engine = ArcEngine::new(2);
        engine.insert("a", 1, None);
        engine.insert("b", 2, None);
        engine.insert("c", 3, None);
        engine.get(&"b", now());

        let purged = engine.purge();
        assert_eq!(purged.len(), 2);
        assert_eq!(engine.len(false, now()), 0);
        assert!(engine.b1.is_empty());
        assert!(engine.b2.is_empty());
        assert_eq!(engine.p_value(), 0);
        engine.debug_validate_invariants();
    }
}
