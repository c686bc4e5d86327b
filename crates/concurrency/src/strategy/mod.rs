//! The pluggable cache-strategy capability trait and its two implementations

mod default;
mod eviction;

pub use default::{DefaultStrategy, ExpiryContext};
pub use eviction::{EvictionContext, EvictionStrategy};

use memo_core::{CallOptions, CanonicalKey, Settings};
use memo_storage::StoreHandle;

/// What a read hook decided about an entry it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The entry is still valid; return it to the caller.
    Ok,
    /// The entry was invalidated as part of the read; the coordinator must
    /// re-dispatch rather than return the value it was just handed.
    Retry,
}

/// A pluggable policy controlling admission context, read-time expiration,
/// invalidation, and garbage collection for one backing-store variant.
///
/// The coordinator never inspects `Context` — it is opaque, strategy-owned
/// metadata threaded through [`memo_storage::EntryState::Completed`]. The
/// coordinator never touches a `Running` row on the strategy's behalf either:
/// strategy operations only ever act on `Completed` entries.
pub trait CacheStrategy<V>: Send + Sync {
    /// Strategy-supplied metadata stored alongside a completed value.
    type Context: Clone + Send + Sync + 'static;

    /// Called once, on the runner's thread, right after a thunk completes
    /// successfully. Produces the context to store alongside the value.
    fn on_cache(&self, key: &CanonicalKey, value: &V, opts: &CallOptions) -> Self::Context;

    /// Called on every read of a `Completed` entry, on the reading caller's
    /// thread. May invalidate the entry and request a retry (e.g. TTL hit).
    fn on_read(&self, key: &CanonicalKey, value: &V, context: &Self::Context) -> ReadOutcome;

    /// Remove every completed entry. Returns the count removed.
    fn invalidate_all(&self) -> usize;

    /// Remove the completed entry at `key`, if any. Returns `0` or `1`.
    fn invalidate(&self, key: &CanonicalKey) -> usize;

    /// Reclaim space or sweep expired entries per the strategy's own policy.
    /// Returns the count removed.
    fn garbage_collect(&self) -> usize;
}

/// Uniform construction for a strategy over a given backing store, letting
/// the coordinator build "whichever strategy the settings name" generically.
pub trait NewFromStore<V>: CacheStrategy<V> + Sized {
    /// Install this strategy over `store` per `settings`.
    fn new_over(store: StoreHandle<CanonicalKey, V, Self::Context>, settings: &Settings) -> Self;
}

impl<V> NewFromStore<V> for DefaultStrategy<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn new_over(store: StoreHandle<CanonicalKey, V, Self::Context>, settings: &Settings) -> Self {
        DefaultStrategy::new(store, settings)
    }
}

impl<V> NewFromStore<V> for EvictionStrategy<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn new_over(store: StoreHandle<CanonicalKey, V, Self::Context>, settings: &Settings) -> Self {
        EvictionStrategy::new(store, settings)
    }
}
