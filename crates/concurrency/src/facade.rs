//! Invalidation & GC façade: dispatches to both backing-store variants
//!
//! The primary and persistent stores are invalidated unconditionally and
//! independently of the `CallOptions::cache` selection any individual
//! `get_or_run` call used — invalidation and GC are engine-wide operations.

use memo_core::{normalize, CanonicalKey, RawKey};

use crate::coordinator::Engine;
use crate::strategy::CacheStrategy;

/// The count of entries acted upon in each backing-store variant by one
/// invalidation or GC call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InvalidationReport {
    /// Entries removed from the primary (in-memory) store.
    pub primary: usize,
    /// Entries removed from the persistent (named) store.
    pub persistent: usize,
}

impl InvalidationReport {
    /// The combined count across both variants.
    pub fn total(&self) -> usize {
        self.primary + self.persistent
    }
}

impl<V, S> Engine<V, S>
where
    V: Clone + Send + Sync + 'static,
    S: CacheStrategy<V>,
{
    /// Remove every completed entry from both backing-store variants.
    pub fn invalidate_all(&self) -> InvalidationReport {
        InvalidationReport {
            primary: self.primary_strategy().invalidate_all(),
            persistent: self.persistent_strategy().invalidate_all(),
        }
    }

    /// Remove the completed entry at `key` from both backing-store variants.
    pub fn invalidate<K: Into<RawKey>>(&self, key: K) -> InvalidationReport {
        let canonical: CanonicalKey = normalize(&key.into());
        InvalidationReport {
            primary: self.primary_strategy().invalidate(&canonical),
            persistent: self.persistent_strategy().invalidate(&canonical),
        }
    }

    /// Run garbage collection on both backing-store variants.
    pub fn garbage_collect(&self) -> InvalidationReport {
        InvalidationReport {
            primary: self.primary_strategy().garbage_collect(),
            persistent: self.persistent_strategy().garbage_collect(),
        }
    }
}
