//! The Eviction strategy: byte-bounded LRU with optional per-entry TTL
//!
//! State lives in three places: the backing table itself, a read-history map
//! ranking entries by recency, and an expiration index for O(log N)
//! head-of-line TTL sweeps. GC is deliberately rare — it only runs when
//! `used_bytes` crosses `max_threshold`, and stops as soon as usage drops to
//! `min_threshold`, giving hysteresis rather than thrashing at the boundary.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use memo_core::{CallOptions, CanonicalKey, Settings, Threshold};
use memo_storage::{BackingStore, EntryState, ExpirationIndex, StoreHandle};

use crate::strategy::{CacheStrategy, ReadOutcome};
use crate::time::now_ms;

/// Eviction metadata attached at insert time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionContext {
    /// Exempts this entry from LRU ranking (still subject to explicit
    /// invalidation).
    pub permanent: bool,
}

/// Byte-bounded LRU with optional per-entry TTL.
pub struct EvictionStrategy<V> {
    store: StoreHandle<CanonicalKey, V, EvictionContext>,
    read_history: DashMap<CanonicalKey, u64>,
    read_counter: AtomicU64,
    expiration: ExpirationIndex<CanonicalKey>,
    max_threshold: Threshold,
    min_threshold: u64,
    default_expires_in_ms: Option<u64>,
}

impl<V> EvictionStrategy<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Install this strategy over `store` per `settings`.
    pub fn new(store: StoreHandle<CanonicalKey, V, EvictionContext>, settings: &Settings) -> Self {
        let default_expires_in_ms = match settings.default_expires_in {
            Threshold::Bounded(ms) => Some(ms),
            Threshold::Unbounded => None,
        };
        Self {
            store,
            read_history: DashMap::new(),
            read_counter: AtomicU64::new(0),
            expiration: ExpirationIndex::new(),
            max_threshold: settings.max_threshold,
            min_threshold: settings.min_threshold.unwrap_or(0),
            default_expires_in_ms,
        }
    }

    /// Coarse byte-usage estimate: the backing table plus the read-history
    /// map, both counted at a fixed average entry size.
    pub fn used_bytes(&self) -> u64 {
        self.store.approx_bytes()
            + (self.read_history.len() as u64)
                .saturating_mul(memo_storage::AVG_ENTRY_BYTES)
    }

    fn delete_if_completed(&self, key: &CanonicalKey) -> usize {
        loop {
            match self.store.lookup(key) {
                None => return 0,
                Some(row) => match &*row.state {
                    EntryState::Completed { .. } => {
                        if self.store.delete_if_equal(key, row.generation) {
                            return 1;
                        }
                    }
                    EntryState::Running { .. } => return 0,
                },
            }
        }
    }

    /// Walk the expiration index from its head, invalidating everything
    /// whose deadline has passed. Returns whether `read_key` itself was
    /// among the entries evicted this sweep.
    fn clear_expired(&self, read_key: &CanonicalKey) -> bool {
        let now = now_ms();
        let mut evicted_read_key = false;
        while let Some(expired_key) = self.expiration.take_expired_head(now) {
            if &expired_key == read_key {
                evicted_read_key = true;
            }
            self.invalidate(&expired_key);
        }
        evicted_read_key
    }
}

impl<V> CacheStrategy<V> for EvictionStrategy<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Context = EvictionContext;

    fn on_cache(&self, key: &CanonicalKey, _value: &V, opts: &CallOptions) -> EvictionContext {
        if self.max_threshold.exceeded_by(self.used_bytes()) {
            self.garbage_collect();
        }
        if let Some(ms) = opts.expires_in_ms.or(self.default_expires_in_ms) {
            self.expiration.insert(now_ms() + ms as i64, key.clone());
        }
        EvictionContext {
            permanent: opts.permanent,
        }
    }

    fn on_read(&self, key: &CanonicalKey, _value: &V, context: &EvictionContext) -> ReadOutcome {
        if self.clear_expired(key) {
            return ReadOutcome::Retry;
        }
        if !context.permanent {
            let counter = self.read_counter.fetch_add(1, Ordering::Relaxed);
            self.read_history.insert(key.clone(), counter);
        }
        ReadOutcome::Ok
    }

    fn invalidate_all(&self) -> usize {
        let removed = self
            .store
            .select_delete(|_, state| matches!(state, EntryState::Completed { .. }));
        self.read_history.clear();
        removed
    }

    fn invalidate(&self, key: &CanonicalKey) -> usize {
        let removed = self.delete_if_completed(key);
        self.read_history.remove(key);
        removed
    }

    fn garbage_collect(&self) -> usize {
        if matches!(self.max_threshold, Threshold::Unbounded) {
            return 0;
        }
        if self.used_bytes() <= self.min_threshold {
            return 0;
        }

        let mut by_recency: Vec<(CanonicalKey, u64)> = self
            .read_history
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        by_recency.sort_by_key(|(_, counter)| *counter);

        let mut deleted = 0;
        for (key, _) in by_recency {
            if self.used_bytes() <= self.min_threshold {
                break;
            }
            if self.delete_if_completed(&key) > 0 {
                self.read_history.remove(&key);
                deleted += 1;
            }
        }
        deleted
    }
}
