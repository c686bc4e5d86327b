//! Monotonic-enough millisecond timestamps
//!
//! TTL and expiration-index comparisons only need a clock that does not run
//! backwards across the lifetime of one process; wall-clock time since the
//! epoch is good enough and keeps the context types (`expired_at_ms`)
//! trivially `Copy` and comparable.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}
