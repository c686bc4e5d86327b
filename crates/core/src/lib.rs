//! Core types for the concurrent memoization engine
//!
//! This crate defines the foundational, storage-agnostic types used throughout
//! the system:
//! - `key`: structured key trees and their canonical, hashable normal form
//! - `settings`: the configuration record consumed at engine construction
//! - `error`: the error hierarchy surfaced to callers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod key;
pub mod settings;

pub use error::{ConfigError, GetOrRunError};
pub use key::{normalize, CanonicalKey, RawKey};
pub use settings::{CacheSelection, CacheStrategyKind, CallOptions, Settings, Threshold};
