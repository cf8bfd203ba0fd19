//! LIRS (Low Inter-reference Recency Set) replacement policy.
//!
//! Entries are classified by inter-reference recency: LIR entries (low IRR,
//! the protected hot set) and HIR entries (high IRR). Two structures drive
//! the classification:
//!
//! ```text
//!   Stack S (recency)                  Queue Q (resident HIR FIFO)
//!   top ─► [k5 HIR resident]           front ─► [k3]  ◄─ eviction victim
//!          [k2 LIR]                             [k5]  ◄─ tail (newest)
//!          [k7 HIR non-resident]
//!          [k1 LIR]  ◄─ bottom is always LIR
//! ```
//!
//! At most `max_lir = floor(0.99 * capacity)` entries are LIR; the rest of
//! the resident budget is served by HIR entries queued in Q. The front of Q
//! is the eviction victim; its value is dropped but the key stays in S as a
//! non-resident HIR so that a re-reference inside the stack range can be
//! detected and promoted to LIR. A hit on a HIR entry still present in S
//! proves a low inter-reference recency: the entry becomes LIR and the
//! stack-bottom LIR is demoted in exchange.
//!
//! Residency is guarded in one place: every path that is about to make an
//! entry resident first calls `ensure_resident_slot`, which evicts the
//! front of Q (or, with no resident HIRs, drops the stack-bottom LIR).
//! Pruning keeps the stack bottom LIR and unlinks pruned non-resident
//! entries from the key index entirely.
//!
//! Reference: Jiang & Zhang, "LIRS: An Efficient Low Inter-reference
//! Recency Set Replacement Policy to Improve Buffer Cache Performance",
//! SIGMETRICS 2002.

use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::time::Instant;

use crate::ds::intrusive_list::IntrusiveList;
use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::policy::{Found, Inserted, Removal};

struct LirsEntry<K, V> {
    key: K,
    /// `None` marks a non-resident entry (tracked in S only).
    value: Option<V>,
    expires_at: Option<Instant>,
    is_lir: bool,
    stack_node: Option<SlotId>,
    queue_node: Option<SlotId>,
}

impl<K, V> LirsEntry<K, V> {
    #[inline]
    fn is_resident(&self) -> bool {
        self.value.is_some()
    }

    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(at) => now > at,
            None => false,
        }
    }
}

pub(crate) struct LirsEngine<K, V> {
    entries: SlotArena<LirsEntry<K, V>>,
    index: FxHashMap<K, SlotId>,
    /// Stack S over entry ids; front is the most recent reference.
    stack: IntrusiveList<SlotId>,
    /// Queue Q over resident HIR entry ids; front is the eviction victim.
    queue: IntrusiveList<SlotId>,
    lir_count: usize,
    resident_count: usize,
    max_lir: usize,
    capacity: usize,
}

impl<K, V> LirsEngine<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        let mut max_lir = (capacity as f64 * 0.99) as usize;
        if max_lir == 0 {
            max_lir = capacity.saturating_sub(1).max(1);
        }
        Self {
            entries: SlotArena::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            stack: IntrusiveList::with_capacity(capacity),
            queue: IntrusiveList::new(),
            lir_count: 0,
            resident_count: 0,
            max_lir,
            capacity,
        }
    }

    pub fn insert(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Inserted<K, V> {
        let mut evicted = Vec::new();

        if let Some(&eid) = self.index.get(&key) {
            let resident = self
                .entries
                .get(eid)
                .map(|e| e.is_resident())
                .unwrap_or(false);
            if resident {
                if let Some(e) = self.entries.get_mut(eid) {
                    e.value = Some(value);
                    e.expires_at = expires_at;
                }
                if let Some(pair) = self.access_resident(eid) {
                    evicted.push(pair);
                }
                return Inserted { updated: true, evicted };
            }

            // Re-reference of a non-resident entry: make room first.
            if let Some(pair) = self.ensure_resident_slot() {
                evicted.push(pair);
            }
            // Making room prunes the stack, which may have dropped the
            // entry itself; re-check before reviving it.
            if self.index.get(&key) == Some(&eid) {
                if let Some(e) = self.entries.get_mut(eid) {
                    e.value = Some(value);
                    e.expires_at = expires_at;
                }
                self.resident_count += 1;
                let in_stack = self
                    .entries
                    .get(eid)
                    .map(|e| e.stack_node.is_some())
                    .unwrap_or(false);
                if in_stack {
                    if let Some(pair) = self.convert_to_lir(eid) {
                        evicted.push(pair);
                    }
                } else {
                    self.queue_push_back(eid);
                    self.stack_push_top(eid);
                }
                return Inserted { updated: true, evicted };
            }
            self.insert_new(key, value, expires_at);
            return Inserted { updated: false, evicted };
        }

        if let Some(pair) = self.ensure_resident_slot() {
            evicted.push(pair);
        }
        self.insert_new(key, value, expires_at);
        Inserted { updated: false, evicted }
    }

    pub fn get(&mut self, key: &K, now: Instant) -> Found<K, V> {
        let eid = match self.index.get(key) {
            Some(&id) => id,
            None => return Found::miss(),
        };
        let (expired, resident) = match self.entries.get(eid) {
            Some(e) => (e.is_expired(now), e.is_resident()),
            None => return Found::miss(),
        };
        if expired {
            self.remove_entry(eid);
            return Found::miss();
        }
        if !resident {
            return Found::miss();
        }

        let mut found = Found::miss();
        if let Some(pair) = self.access_resident(eid) {
            found.evicted.push(pair);
        }
        found.value = self.entries.get(eid).and_then(|e| e.value.clone());
        found
    }

    pub fn peek(&self, key: &K, now: Instant) -> Option<V> {
        let &eid = self.index.get(key)?;
        let entry = self.entries.get(eid)?;
        if entry.is_expired(now) {
            return None;
        }
        entry.value.clone()
    }

    pub fn contains(&self, key: &K, now: Instant) -> bool {
        match self.index.get(key) {
            Some(&eid) => self
                .entries
                .get(eid)
                .map(|e| e.is_resident() && !e.is_expired(now))
                .unwrap_or(false),
            None => false,
        }
    }

    pub fn remove(&mut self, key: &K) -> Removal<V> {
        match self.index.get(key) {
            Some(&eid) => self.remove_entry(eid),
            None => Removal::Absent,
        }
    }

    pub fn keys(&self, check_expired: bool, now: Instant) -> Vec<K> {
        self.entries
            .iter()
            .filter(|(_, e)| e.is_resident() && (!check_expired || !e.is_expired(now)))
            .map(|(_, e)| e.key.clone())
            .collect()
    }

    pub fn entries(&self, check_expired: bool, now: Instant) -> Vec<(K, V)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.is_resident() && (!check_expired || !e.is_expired(now)))
            .filter_map(|(_, e)| e.value.clone().map(|v| (e.key.clone(), v)))
            .collect()
    }

    pub fn len(&self, check_expired: bool, now: Instant) -> usize {
        if !check_expired {
            return self.resident_count;
        }
        self.entries
            .iter()
            .filter(|(_, e)| e.is_resident() && !e.is_expired(now))
            .count()
    }

    pub fn purge(&mut self) -> Vec<(K, V)> {
        let mut drained = Vec::with_capacity(self.resident_count);
        for (_, entry) in self.entries.iter() {
            if let Some(value) = entry.value.clone() {
                drained.push((entry.key.clone(), value));
            }
        }
        self.entries.clear();
        self.index.clear();
        self.stack.clear();
        self.queue.clear();
        self.lir_count = 0;
        self.resident_count = 0;
        drained
    }

    /// Handles a reference to a resident entry (rules for LIR, HIR-in-S,
    /// and HIR-outside-S). Returns an entry displaced by a promotion.
    fn access_resident(&mut self, eid: SlotId) -> Option<(K, V)> {
        let (is_lir, in_stack) = match self.entries.get(eid) {
            Some(e) => (e.is_lir, e.stack_node.is_some()),
            None => return None,
        };

        if is_lir {
            let was_bottom = self.is_stack_bottom(eid);
            self.stack_push_top(eid);
            if was_bottom {
                self.prune_stack();
            }
            None
        } else if in_stack {
            // The reuse distance fits inside the stack: promote to LIR.
            self.convert_to_lir(eid)
        } else {
            self.queue_move_to_back(eid);
            self.stack_push_top(eid);
            None
        }
    }

    /// Promotes a HIR entry to LIR, demoting the stack-bottom LIR in
    /// exchange when the LIR set or the cache is full.
    fn convert_to_lir(&mut self, eid: SlotId) -> Option<(K, V)> {
        self.queue_remove(eid);

        let mut evicted = None;
        if self.lir_count >= self.max_lir || self.resident_count >= self.capacity {
            if let Some(bottom) = self.stack_bottom() {
                let bottom_is_lir = self
                    .entries
                    .get(bottom)
                    .map(|e| e.is_lir)
                    .unwrap_or(false);
                if bottom != eid && bottom_is_lir {
                    self.demote_to_hir(bottom);
                    if self.resident_count >= self.capacity {
                        evicted = self.evict_queue_front();
                    }
                }
            }
        }

        if let Some(e) = self.entries.get_mut(eid) {
            e.is_lir = true;
        }
        self.lir_count += 1;
        self.stack_push_top(eid);
        self.prune_stack();
        evicted
    }

    /// Demotes an LIR entry to HIR; a resident demotee joins the queue.
    fn demote_to_hir(&mut self, eid: SlotId) {
        let resident = match self.entries.get_mut(eid) {
            Some(e) => {
                e.is_lir = false;
                e.is_resident()
            },
            None => return,
        };
        self.lir_count -= 1;
        if self.is_stack_bottom(eid) {
            if let Some(node) = self.entries.get(eid).and_then(|e| e.stack_node) {
                self.stack.remove(node);
            }
            if let Some(e) = self.entries.get_mut(eid) {
                e.stack_node = None;
            }
        }
        if resident {
            self.queue_push_back(eid);
        }
    }

    /// Frees one resident slot when the cache is full.
    ///
    /// Preferred victim is the front of Q; with no resident HIRs the
    /// stack-bottom LIR is dropped entirely.
    fn ensure_resident_slot(&mut self) -> Option<(K, V)> {
        if self.resident_count < self.capacity {
            return None;
        }
        if !self.queue.is_empty() {
            return self.evict_queue_front();
        }
        let bottom = self.stack_bottom()?;
        let key = self.entries.get(bottom)?.key.clone();
        match self.remove_entry(bottom) {
            Removal::Resident(value) => Some((key, value)),
            _ => None,
        }
    }

    /// Evicts the front of Q: the value is dropped but the entry stays in
    /// the stack as a non-resident HIR. An entry absent from the stack is
    /// dropped entirely.
    fn evict_queue_front(&mut self) -> Option<(K, V)> {
        let eid = *self.queue.front()?;
        self.queue.pop_front();

        let (key, value, in_stack) = {
            let entry = self.entries.get_mut(eid)?;
            entry.queue_node = None;
            let value = entry.value.take();
            (entry.key.clone(), value, entry.stack_node.is_some())
        };
        let value = value?;
        self.resident_count -= 1;

        if !in_stack {
            self.entries.remove(eid);
            self.index.remove(&key);
        }
        Some((key, value))
    }

    fn insert_new(&mut self, key: K, value: V, expires_at: Option<Instant>) {
        let is_lir = self.lir_count < self.max_lir;
        let eid = self.entries.insert(LirsEntry {
            key: key.clone(),
            value: Some(value),
            expires_at,
            is_lir,
            stack_node: None,
            queue_node: None,
        });
        self.index.insert(key, eid);
        self.resident_count += 1;
        if is_lir {
            self.lir_count += 1;
        } else {
            self.queue_push_back(eid);
        }
        self.stack_push_top(eid);
    }

    /// Unlinks an entry from every structure.
    fn remove_entry(&mut self, eid: SlotId) -> Removal<V> {
        let (stack_node, queue_node, is_lir) = match self.entries.get(eid) {
            Some(e) => (e.stack_node, e.queue_node, e.is_lir),
            None => return Removal::Absent,
        };
        if let Some(node) = stack_node {
            self.stack.remove(node);
        }
        if let Some(node) = queue_node {
            self.queue.remove(node);
        }
        if is_lir {
            self.lir_count -= 1;
        }
        let entry = match self.entries.remove(eid) {
            Some(entry) => entry,
            None => return Removal::Absent,
        };
        self.index.remove(&entry.key);
        self.prune_stack();
        match entry.value {
            Some(value) => {
                self.resident_count -= 1;
                Removal::Resident(value)
            },
            None => Removal::Ghost,
        }
    }

    /// Removes HIR entries from the stack bottom until an LIR entry is at
    /// the bottom or the stack is empty. Pruned non-resident entries are
    /// forgotten entirely.
    fn prune_stack(&mut self) {
        while let Some(&bottom_eid) = self.stack.back() {
            let (is_lir, resident) = match self.entries.get(bottom_eid) {
                Some(e) => (e.is_lir, e.is_resident()),
                None => {
                    self.stack.pop_back();
                    continue;
                },
            };
            if is_lir {
                break;
            }
            self.stack.pop_back();
            if let Some(e) = self.entries.get_mut(bottom_eid) {
                e.stack_node = None;
            }
            if !resident {
                if let Some(entry) = self.entries.remove(bottom_eid) {
                    self.index.remove(&entry.key);
                }
            }
        }
    }

    fn stack_bottom(&self) -> Option<SlotId> {
        self.stack.back().copied()
    }

    fn is_stack_bottom(&self, eid: SlotId) -> bool {
        match self.entries.get(eid).and_then(|e| e.stack_node) {
            Some(node) => self.stack.back_id() == Some(node),
            None => false,
        }
    }

    fn stack_push_top(&mut self, eid: SlotId) {
        match self.entries.get(eid).and_then(|e| e.stack_node) {
            Some(node) => {
                self.stack.move_to_front(node);
            },
            None => {
                let node = self.stack.push_front(eid);
                if let Some(e) = self.entries.get_mut(eid) {
                    e.stack_node = Some(node);
                }
            },
        }
    }

    fn queue_push_back(&mut self, eid: SlotId) {
        match self.entries.get(eid).and_then(|e| e.queue_node) {
            Some(node) => {
                self.queue.move_to_back(node);
            },
            None => {
                let node = self.queue.push_back(eid);
                if let Some(e) = self.entries.get_mut(eid) {
                    e.queue_node = Some(node);
                }
            },
        }
    }

    fn queue_move_to_back(&mut self, eid: SlotId) {
        self.queue_push_back(eid);
    }

    fn queue_remove(&mut self, eid: SlotId) {
        if let Some(node) = self.entries.get(eid).and_then(|e| e.queue_node) {
            self.queue.remove(node);
            if let Some(e) = self.entries.get_mut(eid) {
                e.queue_node = None;
            }
        }
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        let resident = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_resident())
            .count();
        assert_eq!(resident, self.resident_count);
        assert!(self.resident_count <= self.capacity);

        let lir = self.entries.iter().filter(|(_, e)| e.is_lir).count();
        assert_eq!(lir, self.lir_count);
        assert!(self.lir_count <= self.max_lir);

        // Q holds exactly the resident HIR entries that joined it, and
        // every queued entry must be resident.
        for eid in self.queue.iter() {
            let entry = self.entries.get(*eid).expect("queued entry missing");
            assert!(!entry.is_lir);
            assert!(entry.is_resident());
        }

        // Whenever any LIR entry exists the stack bottom is LIR.
        if self.lir_count > 0 {
            let bottom = self.stack_bottom().expect("stack empty with LIR entries");
            assert!(self.entries.get(bottom).expect("bottom missing").is_lir);
        }

        // Non-resident entries survive only inside the stack.
        for (_, entry) in self.entries.iter() {
            if !entry.is_resident() {
                assert!(entry.stack_node.is_some());
            }
        }

        assert_eq!(self.entries.len(), self.index.len());
        self.stack.debug_validate_invariants();
        self.queue.debug_validate_invariants();
    }
}
