//! Backing-store primitives for the concurrent memoization engine
//!
//! Two concrete variants share the same [`BackingStore`] contract: an
//! in-memory concurrent table ([`MemoryStore`]) and a process-global
//! named-value store ([`PersistentStore`]). [`StoreHandle`] lets a cache
//! strategy or the coordinator hold either one behind a single concrete type.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod expiration;
pub mod row;
pub mod store;

pub use expiration::ExpirationIndex;
pub use row::{
    next_runner_id, next_waiter_id, EntryState, Outcome, Row, RunnerId, Waiter, WaiterId,
    WaiterSignal,
};
pub use store::{BackingStore, MemoryStore, PersistentStore, StoreHandle, AVG_ENTRY_BYTES};
