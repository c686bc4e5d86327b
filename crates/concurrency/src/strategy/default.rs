//! The Default strategy: per-entry TTL, no byte accounting

use std::hash::Hash;

use memo_core::{CallOptions, CanonicalKey, Settings, Threshold};
use memo_storage::{BackingStore, EntryState, StoreHandle};

use crate::time::now_ms;
use crate::strategy::{CacheStrategy, ReadOutcome};

/// Per-entry TTL metadata attached at insert time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryContext {
    /// Milliseconds-since-epoch deadline, or `None` for no expiry.
    pub expires_at_ms: Option<i64>,
}

/// TTL-per-entry strategy. `garbage_collect` sweeps everything past its
/// deadline; `on_read` additionally catches an entry whose TTL elapsed since
/// the last sweep.
pub struct DefaultStrategy<V> {
    store: StoreHandle<CanonicalKey, V, ExpiryContext>,
    default_expires_in_ms: Option<u64>,
}

impl<V> DefaultStrategy<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Install this strategy over `store`, merging `expires_in` from settings.
    pub fn new(store: StoreHandle<CanonicalKey, V, ExpiryContext>, settings: &Settings) -> Self {
        let default_expires_in_ms = match settings.default_expires_in {
            Threshold::Bounded(ms) => Some(ms),
            Threshold::Unbounded => None,
        };
        Self {
            store,
            default_expires_in_ms,
        }
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
                        // Lost race against a concurrent writer; re-read and retry.
                    }
                    EntryState::Running { .. } => return 0,
                },
            }
        }
    }
}

impl<V> CacheStrategy<V> for DefaultStrategy<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Context = ExpiryContext;

    fn on_cache(&self, _key: &CanonicalKey, _value: &V, opts: &CallOptions) -> ExpiryContext {
        let ms = opts.expires_in_ms.or(self.default_expires_in_ms);
        ExpiryContext {
            expires_at_ms: ms.map(|ms| now_ms() + ms as i64),
        }
    }

    fn on_read(&self, key: &CanonicalKey, _value: &V, context: &ExpiryContext) -> ReadOutcome {
        if let Some(deadline) = context.expires_at_ms {
            if now_ms() > deadline {
                self.delete_if_completed(key);
                return ReadOutcome::Retry;
            }
        }
        ReadOutcome::Ok
    }

    fn invalidate_all(&self) -> usize {
        self.store
            .select_delete(|_, state| matches!(state, EntryState::Completed { .. }))
    }

    fn invalidate(&self, key: &CanonicalKey) -> usize {
        self.delete_if_completed(key)
    }

    fn garbage_collect(&self) -> usize {
        let now = now_ms();
        self.store.select_delete(|_, state| match state {
            EntryState::Completed { context, .. } => {
                matches!(context.expires_at_ms, Some(deadline) if deadline < now)
            }
            EntryState::Running { .. } => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memo_core::normalize;
    use memo_storage::MemoryStore;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn strategy(settings: &Settings) -> DefaultStrategy<i32> {
        let store = StoreHandle::Memory(Arc::new(MemoryStore::new()));
        DefaultStrategy::new(store, settings)
    }

    fn key(s: &str) -> CanonicalKey {
        normalize(&s.into())
    }

    #[test]
    fn on_cache_uses_settings_default_when_no_override() {
        let mut settings = Settings::default();
        settings.default_expires_in = Threshold::Bounded(1_000);
        let strat = strategy(&settings);
        let opts = CallOptions::default();
        let ctx = strat.on_cache(&key("k"), &1, &opts);
        assert!(ctx.expires_at_ms.is_some());
    }

    #[test]
    fn on_cache_call_site_override_wins() {
        let strat = strategy(&Settings::default());
        let opts = CallOptions {
            expires_in_ms: Some(5_000),
            ..Default::default()
        };
        let ctx = strat.on_cache(&key("k"), &1, &opts);
        assert!(ctx.expires_at_ms.is_some());
    }

    #[test]
    fn on_read_retries_past_deadline_and_clears_the_row() {
        let strat = strategy(&Settings::default());
        let k = key("k");
        strat
            .store
            .insert_if_absent(
                k.clone(),
                EntryState::Completed {
                    value: 1,
                    context: ExpiryContext {
                        expires_at_ms: Some(now_ms() - 1),
                    },
                },
            )
            .unwrap();

        assert_eq!(
            strat.on_read(&k, &1, &ExpiryContext { expires_at_ms: Some(now_ms() - 1) }),
            ReadOutcome::Retry
        );
        assert!(strat.store.lookup(&k).is_none());
    }

    #[test]
    fn on_read_ok_within_deadline() {
        let strat = strategy(&Settings::default());
        let ctx = ExpiryContext {
            expires_at_ms: Some(now_ms() + 10_000),
        };
        assert_eq!(strat.on_read(&key("k"), &1, &ctx), ReadOutcome::Ok);
    }

    #[test]
    fn garbage_collect_sweeps_only_expired_completed_rows() {
        let strat = strategy(&Settings::default());
        strat
            .store
            .insert_if_absent(
                key("expired"),
                EntryState::Completed {
                    value: 1,
                    context: ExpiryContext {
                        expires_at_ms: Some(now_ms() - 10),
                    },
                },
            )
            .unwrap();
        strat
            .store
            .insert_if_absent(
                key("fresh"),
                EntryState::Completed {
                    value: 2,
                    context: ExpiryContext { expires_at_ms: None },
                },
            )
            .unwrap();

        let removed = strat.garbage_collect();
        assert_eq!(removed, 1);
        assert!(strat.store.lookup(&key("expired")).is_none());
        assert!(strat.store.lookup(&key("fresh")).is_some());
    }

    #[test]
    fn invalidate_all_clears_every_completed_row() {
        let strat = strategy(&Settings::default());
        for i in 0..3 {
            strat
                .store
                .insert_if_absent(
                    key(&i.to_string()),
                    EntryState::Completed {
                        value: i,
                        context: ExpiryContext { expires_at_ms: None },
                    },
                )
                .unwrap();
        }
        assert_eq!(strat.invalidate_all(), 3);
        assert_eq!(strat.store.len(), 0);
    }

    #[test]
    fn ttl_elapses_after_sleeping_past_it() {
        let mut settings = Settings::default();
        settings.default_expires_in = Threshold::Bounded(10);
        let strat = strategy(&settings);
        let ctx = strat.on_cache(&key("k"), &1, &CallOptions::default());
        thread::sleep(Duration::from_millis(25));
        assert_eq!(strat.on_read(&key("k"), &1, &ctx), ReadOutcome::Retry);
    }
}
