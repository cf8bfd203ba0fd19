//! Least Frequently Used replacement policy.
//!
//! Entries are grouped into frequency buckets: a doubly linked chain of
//! buckets, one per distinct frequency, each holding an intrusive list of
//! the entries sharing that frequency (front = newest). A hit moves the
//! entry one bucket up, creating the target bucket next to the current one
//! when it does not exist yet and dropping buckets that become empty.
//!
//! ```text
//!   buckets:   [freq 1] ◄──► [freq 2] ◄──► [freq 5]
//!                 │              │             │
//!               e3→e1          e4            e2
//!               ▲  ▲
//!               │  └── tail = oldest = eviction victim
//!               └── head = newest
//!
//!   min_freq = 1 (0 when the engine is empty)
//! ```
//!
//! Eviction removes the tail of the lowest bucket, so ties on frequency
//! break toward the oldest entry. New entries start at frequency 1; an
//! update of an existing key counts as a hit before the value is replaced.

use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::time::Instant;

use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::policy::{Found, Inserted, Removal, ValueEntry};

struct LfuEntry<K, V> {
    key: K,
    entry: ValueEntry<V>,
    freq: u64,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

struct Bucket {
    head: Option<SlotId>,
    tail: Option<SlotId>,
    prev: Option<u64>,
    next: Option<u64>,
}

pub(crate) struct LfuEngine<K, V> {
    entries: SlotArena<LfuEntry<K, V>>,
    index: FxHashMap<K, SlotId>,
    buckets: FxHashMap<u64, Bucket>,
    /// Lowest populated frequency; 0 when the engine is empty.
    min_freq: u64,
    capacity: usize,
}

impl<K, V> LfuEngine<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: SlotArena::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            buckets: FxHashMap::default(),
            min_freq: 0,
            capacity,
        }
    }

    pub fn insert(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Inserted<K, V> {
        if let Some(&id) = self.index.get(&key) {
            self.bump(id);
            if let Some(e) = self.entries.get_mut(id) {
                e.entry = ValueEntry::new(value, expires_at);
            }
            return Inserted::update();
        }

        let mut evicted = Vec::new();
        if self.index.len() >= self.capacity {
            if let Some(pair) = self.pop_lowest() {
                evicted.push(pair);
            }
        }

        let id = self.entries.insert(LfuEntry {
            key: key.clone(),
            entry: ValueEntry::new(value, expires_at),
            freq: 1,
            prev: None,
            next: None,
        });
        self.index.insert(key, id);

        if !self.buckets.contains_key(&1) {
            let next = if self.min_freq == 0 {
                None
            } else {
                Some(self.min_freq)
            };
            self.insert_bucket(1, None, next);
        }
        self.bucket_push_front(1, id);
        self.min_freq = 1;

        Inserted::fresh(evicted)
    }

    pub fn get(&mut self, key: &K, now: Instant) -> Found<K, V> {
        let id = match self.index.get(key) {
            Some(&id) => id,
            None => return Found::miss(),
        };
        let expired = self
            .entries
            .get(id)
            .map(|e| e.entry.is_expired(now))
            .unwrap_or(true);
        if expired {
            self.unlink(id);
            return Found::miss();
        }
        self.bump(id);
        let value = self.entries.get(id).map(|e| e.entry.value.clone());
        Found {
            value,
            evicted: Vec::new(),
        }
    }

    pub fn peek(&self, key: &K, now: Instant) -> Option<V> {
        let &id = self.index.get(key)?;
        self.entries
            .get(id)
            .filter(|e| !e.entry.is_expired(now))
            .map(|e| e.entry.value.clone())
    }

    pub fn contains(&self, key: &K, now: Instant) -> bool {
        match self.index.get(key) {
            Some(&id) => self
                .entries
                .get(id)
                .map(|e| !e.entry.is_expired(now))
                .unwrap_or(false),
            None => false,
        }
    }

    pub fn remove(&mut self, key: &K) -> Removal<V> {
        match self.index.get(key) {
            Some(&id) => match self.unlink(id) {
                Some(entry) => Removal::Resident(entry.entry.value),
                None => Removal::Absent,
            },
            None => Removal::Absent,
        }
    }

    pub fn keys(&self, check_expired: bool, now: Instant) -> Vec<K> {
        self.entries
            .iter()
            .filter(|(_, e)| !check_expired || !e.entry.is_expired(now))
            .map(|(_, e)| e.key.clone())
            .collect()
    }

    pub fn entries(&self, check_expired: bool, now: Instant) -> Vec<(K, V)> {
        self.entries
            .iter()
            .filter(|(_, e)| !check_expired || !e.entry.is_expired(now))
            .map(|(_, e)| (e.key.clone(), e.entry.value.clone()))
            .collect()
    }

    pub fn len(&self, check_expired: bool, now: Instant) -> usize {
        if !check_expired {
            return self.index.len();
        }
        self.entries
            .iter()
            .filter(|(_, e)| !e.entry.is_expired(now))
            .count()
    }

    pub fn purge(&mut self) -> Vec<(K, V)> {
        let mut drained = Vec::with_capacity(self.index.len());
        for (_, entry) in self.entries.iter() {
            drained.push((entry.key.clone(), entry.entry.value.clone()));
        }
        self.entries.clear();
        self.index.clear();
        self.buckets.clear();
        self.min_freq = 0;
        drained
    }

    /// Current frequency of `key`, if tracked.
    #[cfg(test)]
    pub fn frequency(&self, key: &K) -> Option<u64> {
        let &id = self.index.get(key)?;
        self.entries.get(id).map(|e| e.freq)
    }

    /// Moves an entry to the next higher frequency bucket.
    fn bump(&mut self, id: SlotId) {
        let current = match self.entries.get(id) {
            Some(e) => e.freq,
            None => return,
        };
        if current == u64::MAX {
            // Saturated counter: refresh position within the bucket.
            self.bucket_remove(current, id);
            self.bucket_push_front(current, id);
            return;
        }
        let next_freq = current + 1;

        let (bucket_prev, bucket_next) = match self.buckets.get(&current) {
            Some(bucket) => (bucket.prev, bucket.next),
            None => return,
        };

        self.bucket_remove(current, id);
        let current_empty = self.bucket_is_empty(current);
        if current_empty {
            self.remove_bucket(current, bucket_prev, bucket_next);
            if self.min_freq == current {
                self.min_freq = bucket_next.unwrap_or(0);
            }
        }

        if !self.buckets.contains_key(&next_freq) {
            let prev = if current_empty {
                bucket_prev
            } else {
                Some(current)
            };
            self.insert_bucket(next_freq, prev, bucket_next);
        }

        if let Some(e) = self.entries.get_mut(id) {
            e.freq = next_freq;
        }
        self.bucket_push_front(next_freq, id);
        if self.min_freq == 0 || next_freq < self.min_freq {
            self.min_freq = next_freq;
        }
    }

    /// Removes the oldest entry of the lowest frequency bucket.
    fn pop_lowest(&mut self) -> Option<(K, V)> {
        let freq = self.min_freq;
        if freq == 0 {
            return None;
        }
        let id = self.buckets.get(&freq)?.tail?;
        let entry = self.unlink(id)?;
        Some((entry.key, entry.entry.value))
    }

    /// Detaches `id` from its bucket, the index, and the arena.
    fn unlink(&mut self, id: SlotId) -> Option<LfuEntry<K, V>> {
        let freq = self.entries.get(id)?.freq;
        let (bucket_prev, bucket_next) = match self.buckets.get(&freq) {
            Some(bucket) => (bucket.prev, bucket.next),
            None => (None, None),
        };

        self.bucket_remove(freq, id);
        if self.bucket_is_empty(freq) {
            self.remove_bucket(freq, bucket_prev, bucket_next);
            if self.min_freq == freq {
                self.min_freq = bucket_next.unwrap_or(0);
            }
        }

        let entry = self.entries.remove(id)?;
        self.index.remove(&entry.key);
        Some(entry)
    }

    fn bucket_is_empty(&self, freq: u64) -> bool {
        self.buckets
            .get(&freq)
            .map(|bucket| bucket.head.is_none())
            .unwrap_or(true)
    }

    fn insert_bucket(&mut self, freq: u64, prev: Option<u64>, next: Option<u64>) {
        self.buckets.insert(
            freq,
            Bucket {
                head: None,
                tail: None,
                prev,
                next,
            },
        );
        if let Some(prev) = prev {
            if let Some(prev_bucket) = self.buckets.get_mut(&prev) {
                prev_bucket.next = Some(freq);
            }
        }
        if let Some(next) = next {
            if let Some(next_bucket) = self.buckets.get_mut(&next) {
                next_bucket.prev = Some(freq);
            }
        }
    }

    fn remove_bucket(&mut self, freq: u64, prev: Option<u64>, next: Option<u64>) {
        if let Some(prev) = prev {
            if let Some(prev_bucket) = self.buckets.get_mut(&prev) {
                prev_bucket.next = next;
            }
        }
        if let Some(next) = next {
            if let Some(next_bucket) = self.buckets.get_mut(&next) {
                next_bucket.prev = prev;
            }
        }
        self.buckets.remove(&freq);
    }

    fn bucket_push_front(&mut self, freq: u64, id: SlotId) {
        let old_head = {
            let bucket = self.buckets.get_mut(&freq).expect("bucket missing");
            let old = bucket.head;
            bucket.head = Some(id);
            if bucket.tail.is_none() {
                bucket.tail = Some(id);
            }
            old
        };
        if let Some(e) = self.entries.get_mut(id) {
            e.prev = None;
            e.next = old_head;
        }
        if let Some(head) = old_head {
            if let Some(he) = self.entries.get_mut(head) {
                he.prev = Some(id);
            }
        }
    }

    fn bucket_remove(&mut self, freq: u64, id: SlotId) {
        let (prev, next) = match self.entries.get(id) {
            Some(e) => (e.prev, e.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(pe) = self.entries.get_mut(p) {
                    pe.next = next;
                }
            },
            None => {
                if let Some(bucket) = self.buckets.get_mut(&freq) {
                    bucket.head = next;
                }
            },
        }
        match next {
            Some(n) => {
                if let Some(ne) = self.entries.get_mut(n) {
                    ne.prev = prev;
                }
            },
            None => {
                if let Some(bucket) = self.buckets.get_mut(&freq) {
                    bucket.tail = prev;
                }
            },
        }
        if let Some(e) = self.entries.get_mut(id) {
            e.prev = None;
            e.next = None;
        }
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert_eq!(self.entries.len(), self.index.len());
        assert!(self.index.len() <= self.capacity);

        if self.entries.is_empty() {
            assert!(self.buckets.is_empty());
            assert_eq!(self.min_freq, 0);
            return;
        }

        assert!(self.min_freq > 0);
        assert!(self.buckets.contains_key(&self.min_freq));

        for (&freq, bucket) in &self.buckets {
            assert!(bucket.head.is_some());
            assert!(bucket.tail.is_some());
            if let Some(prev) = bucket.prev {
                assert!(prev < freq);
                assert_eq!(self.buckets[&prev].next, Some(freq));
            } else {
                assert_eq!(self.min_freq, freq);
            }
            if let Some(next) = bucket.next {
                assert!(next > freq);
                assert_eq!(self.buckets[&next].prev, Some(freq));
            }

            let mut current = bucket.head;
            let mut last = None;
            while let Some(id) = current {
                let entry = self.entries.get(id).expect("bucket entry missing");
                assert_eq!(entry.freq, freq);
                assert_eq!(entry.prev, last);
                assert_eq!(self.index.get(&entry.key), Some(&id));
                last = Some(id);
                current = entry.next;
            }
            assert_eq!(bucket.tail, last);
        }
    }
}
