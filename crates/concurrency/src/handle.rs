//! Runtime strategy selection
//!
//! `Engine<V, S>` is generic over which [`CacheStrategy`] it runs, fixed at
//! compile time. Most callers, though, only know which strategy to run once
//! they have read `Settings::cache_strategy` off disk. [`AnyEngine`] closes
//! that gap the same way [`memo_storage::StoreHandle`] closes it for backing
//! stores: one concrete enum, matched on at each call, rather than a trait
//! object (`CacheStrategy::Context` differs per variant, so the two engines
//! are not interchangeable behind one vtable anyway).

use memo_core::{CacheStrategyKind, CallOptions, GetOrRunError, RawKey, Settings};

use crate::coordinator::Engine;
use crate::facade::InvalidationReport;
use crate::strategy::{DefaultStrategy, EvictionStrategy};

/// Either concrete engine instantiation, selected by [`Settings::cache_strategy`].
pub enum AnyEngine<V: Clone + Send + Sync + 'static> {
    /// Per-entry TTL, no byte accounting.
    Default(Engine<V, DefaultStrategy<V>>),
    /// Byte-bounded LRU with optional per-entry TTL.
    Eviction(Engine<V, EvictionStrategy<V>>),
}

impl<V: Clone + Send + Sync + 'static> AnyEngine<V> {
    /// Build the engine variant named by `settings.cache_strategy`.
    pub fn new(persistent_name: &'static str, settings: Settings) -> Self {
        match settings.cache_strategy {
            CacheStrategyKind::Default => {
                AnyEngine::Default(Engine::new(persistent_name, settings))
            }
            CacheStrategyKind::Eviction => {
                AnyEngine::Eviction(Engine::new(persistent_name, settings))
            }
        }
    }

    /// See [`Engine::get_or_run`].
    pub fn get_or_run<K, F, E>(&self, key: K, opts: CallOptions, thunk: F) -> Result<V, GetOrRunError<E>>
    where
        K: Into<RawKey>,
        F: Fn() -> Result<V, E>,
    {
        match self {
            AnyEngine::Default(engine) => engine.get_or_run(key, opts, thunk),
            AnyEngine::Eviction(engine) => engine.get_or_run(key, opts, thunk),
        }
    }

    /// See [`Engine::invalidate_all`].
    pub fn invalidate_all(&self) -> InvalidationReport {
        match self {
            AnyEngine::Default(engine) => engine.invalidate_all(),
            AnyEngine::Eviction(engine) => engine.invalidate_all(),
        }
    }

    /// See [`Engine::invalidate`].
    pub fn invalidate<K: Into<RawKey>>(&self, key: K) -> InvalidationReport {
        match self {
            AnyEngine::Default(engine) => engine.invalidate(key),
            AnyEngine::Eviction(engine) => engine.invalidate(key),
        }
    }

    /// See [`Engine::garbage_collect`].
    pub fn garbage_collect(&self) -> InvalidationReport {
        match self {
            AnyEngine::Default(engine) => engine.garbage_collect(),
            AnyEngine::Eviction(engine) => engine.garbage_collect(),
        }
    }
}
