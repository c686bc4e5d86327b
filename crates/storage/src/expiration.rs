//! Ordered expiration index: deadline to key, for O(log N) head-of-line sweeps
//!
//! Keyed by `(expires_at_ms, unique_counter)` so ties at the same millisecond
//! never collide and iteration order is still a total order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// An ordered index from expiry deadline to cache key.
pub struct ExpirationIndex<K> {
    index: Mutex<BTreeMap<(i64, u64), K>>,
    counter: AtomicU64,
}

impl<K> Default for ExpirationIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone> ExpirationIndex<K> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            index: Mutex::new(BTreeMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Record that `key` expires at `expires_at_ms`.
    pub fn insert(&self, expires_at_ms: i64, key: K) {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        self.index.lock().insert((expires_at_ms, counter), key);
    }

    /// If the head of the index is expired as of `now_ms`, remove and return
    /// it; otherwise leave the index untouched and return `None`. Safe to
    /// call concurrently: a racing caller that already removed the same head
    /// entry simply sees an empty or later front on its next call.
    pub fn take_expired_head(&self, now_ms: i64) -> Option<K> {
        let mut index = self.index.lock();
        let front = *index.iter().next()?.0;
        if front.0 < now_ms {
            index.remove(&front)
        } else {
            None
        }
    }

    /// Whether the index currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.index.lock().is_empty()
    }

    /// Number of entries currently tracked.
    pub fn len(&self) -> usize {
        self.index.lock().len()
    }
}
