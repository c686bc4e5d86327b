#![warn(missing_docs)]
#![warn(clippy::all)]
//! The concurrent memoization engine: coordinator, cache strategies, and the
//! invalidation/GC façade built on top of `memo-core` and `memo-storage`.

mod coordinator;
mod facade;
mod handle;
mod strategy;
mod time;

pub use coordinator::{Engine, WAITER_TIMEOUT_MS};
pub use facade::InvalidationReport;
pub use handle::AnyEngine;
pub use strategy::{
    CacheStrategy, DefaultStrategy, EvictionContext, EvictionStrategy, ExpiryContext,
    NewFromStore, ReadOutcome,
};
