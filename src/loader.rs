//! Single-flight coalescing for loader calls.
//!
//! At most one loader runs per key at any time. The first caller to miss
//! registers a call and runs the loader; callers that miss while the call
//! is outstanding either block on its condvar and receive a clone of the
//! same result, or (for non-waiting lookups) bail out immediately. The call
//! is retired once the result is published, so a later miss starts a fresh
//! load episode.

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::error::CacheError;

/// One outstanding load with its broadcast slot.
pub(crate) struct LoadCall<V> {
    result: Mutex<Option<Result<V, CacheError>>>,
    done: Condvar,
}

impl<V: Clone> LoadCall<V> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    /// Blocks until the owner publishes a result.
    pub fn wait(&self) -> Result<V, CacheError> {
        let mut slot = self.result.lock();
        while slot.is_none() {
            self.done.wait(&mut slot);
        }
        slot.clone().expect("load call completed without result")
    }

    fn complete(&self, result: Result<V, CacheError>) {
        let mut slot = self.result.lock();
        *slot = Some(result);
        self.done.notify_all();
    }
}

/// How a caller relates to the in-flight call for a key.
pub(crate) enum Flight<V> {
    /// This caller registered the call and must run the loader.
    Owner(Arc<LoadCall<V>>),
    /// Another caller is already loading this key.
    Joined(Arc<LoadCall<V>>),
}

/// Per-cache registry of in-flight loads, keyed by cache key.
pub(crate) struct LoadGroup<K, V> {
    calls: Mutex<FxHashMap<K, Arc<LoadCall<V>>>>,
}

impl<K, V> LoadGroup<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(FxHashMap::default()),
        }
    }

    /// Registers interest in a load for `key`.
    pub fn begin(&self, key: &K) -> Flight<V> {
        let mut calls = self.calls.lock();
        if let Some(call) = calls.get(key) {
            return Flight::Joined(Arc::clone(call));
        }
        let call = Arc::new(LoadCall::new());
        calls.insert(key.clone(), Arc::clone(&call));
        Flight::Owner(call)
    }

    /// Publishes `result` to every waiter and retires the call.
    pub fn finish(&self, key: &K, call: &LoadCall<V>, result: Result<V, CacheError>) {
        call.complete(result);
        self.calls.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn first_caller_is_owner_second_joins() {
        let group: LoadGroup<&str, u32> = LoadGroup::new();

        let owner = group.begin(&"k");
        assert!(matches!(owner, Flight::Owner(_)));
        assert!(matches!(group.begin(&"k"), Flight::Joined(_)));

        if let Flight::Owner(call) = owner {
            group.finish(&"k", &call, Ok(1));
        }
        // The call is retired: the next miss starts a new episode.
        assert!(matches!(group.begin(&"k"), Flight::Owner(_)));
    }

    #[test]
    fn waiters_receive_the_published_result() {
        let group: Arc<LoadGroup<&str, u32>> = Arc::new(LoadGroup::new());
        let owner_call = match group.begin(&"k") {
            Flight::Owner(call) => call,
            Flight::Joined(_) => panic!("expected owner"),
        };

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let group = Arc::clone(&group);
                thread::spawn(move || match group.begin(&"k") {
                    Flight::Joined(call) => call.wait(),
                    Flight::Owner(_) => panic!("load already in flight"),
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        group.finish(&"k", &owner_call, Ok(7));

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap().unwrap(), 7);
        }
    }

    #[test]
    fn errors_are_broadcast_to_waiters() {
        let group: Arc<LoadGroup<&str, u32>> = Arc::new(LoadGroup::new());
        let call = match group.begin(&"k") {
            Flight::Owner(call) => call,
            Flight::Joined(_) => panic!("expected owner"),
        };

        let joined = match group.begin(&"k") {
            Flight::Joined(call) => call,
            Flight::Owner(_) => panic!("expected joined"),
        };

        group.finish(&"k", &call, Err(CacheError::loader_failed("boom".into())));
        assert!(matches!(joined.wait(), Err(CacheError::LoaderFailed(_))));
    }

    #[test]
    fn distinct_keys_do_not_coalesce() {
        let group: LoadGroup<&str, u32> = LoadGroup::new();
        assert!(matches!(group.begin(&"a"), Flight::Owner(_)));
        assert!(matches!(group.begin(&"b"), Flight::Owner(_)));
    }
}
