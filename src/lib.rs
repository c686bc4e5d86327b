//! Concurrent memoization engine.
//!
//! This crate is a thin aggregator: the implementation lives in
//! `memo-core` (key normalization, settings, errors), `memo-storage`
//! (the backing-store primitives), and `memo-engine` (the coordinator
//! and cache strategies). Only the public API surface re-exported here
//! is stable.

pub use memo_core::{
    normalize, CacheSelection, CacheStrategyKind, CallOptions, CanonicalKey, ConfigError,
    GetOrRunError, RawKey, Settings, Threshold,
};
pub use memo_engine::{
    AnyEngine, CacheStrategy, DefaultStrategy, Engine, EvictionContext, EvictionStrategy,
    ExpiryContext, InvalidationReport, NewFromStore, ReadOutcome, WAITER_TIMEOUT_MS,
};
