//! Per-run memo for deterministically keyed sub-resources
//!
//! Only `Success` and `PermanentMiss` are stored. A transient failure is
//! never remembered, so the next lookup of the same key goes back out.

use super::CallOutcome;
use lru::LruCache;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;

pub struct OutcomeMemo<K, T>
where
    K: Hash + Eq,
{
    entries: Mutex<LruCache<K, CallOutcome<T>>>,
}

impl<K, T> OutcomeMemo<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &K) -> Option<CallOutcome<T>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    /// Store a non-transient outcome; transient outcomes are dropped
    pub fn remember(&self, key: K, outcome: &CallOutcome<T>) {
        if outcome.is_transient() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.put(key, outcome.clone());
    }

    /// Return the memoized outcome or run `fetch` and remember its result
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> CallOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        if let Some(hit) = self.get(&key) {
            return hit;
        }
        let outcome = fetch().await;
        self.remember(key, &outcome);
        outcome
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
