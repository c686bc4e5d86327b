//! The per-key entry state and the waiter rendezvous primitive
//!
//! A [`Row`] pairs an [`EntryState`] with a generation counter. The
//! generation, not a deep comparison of the cached value, is what the
//! backing store's compare-and-swap operations check against: every
//! transition replaces the whole row, so a stale generation always means a
//! caller is looking at a world that has already moved on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Identifies the execution context that won the race to compute a key.
pub type RunnerId = u64;
/// Identifies a single waiter's join onto a running computation.
pub type WaiterId = u64;

static NEXT_RUNNER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_WAITER_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a runner id unique to this process for the lifetime of the program.
///
/// Identity, not thread or task address, is what the CAS checks rely on: this
/// is what lets the design tell a new runner apart from a prior one that
/// happened to reuse the same thread.
pub fn next_runner_id() -> RunnerId {
    NEXT_RUNNER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Allocate a waiter id unique to this process for the lifetime of the program.
pub fn next_waiter_id() -> WaiterId {
    NEXT_WAITER_ID.fetch_add(1, Ordering::Relaxed)
}

/// What a waiter's one-shot signal was fulfilled with.
#[derive(Debug, Clone)]
pub enum Outcome<V> {
    /// The runner completed normally; here is the value.
    Completed(V),
    /// The runner's thunk failed, or the runner died before completing.
    Failed,
}

/// A one-shot signal endpoint owned by a single waiter.
///
/// The runner fans out notifications by locking each waiter's own mutex,
/// stamping the outcome, and notifying — never before the row itself has
/// already transitioned to a terminal state. Because the waiter always
/// holds (or is about to take) this same lock before checking for a result,
/// there is no window in which a notification can be sent and lost: whoever
/// acquires the lock first either waits for the other side or already finds
/// the answer sitting in the slot.
pub struct WaiterSignal<V> {
    slot: Mutex<Option<Outcome<V>>>,
    ready: Condvar,
}

impl<V> Default for WaiterSignal<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> WaiterSignal<V> {
    /// Create a new, unfulfilled signal.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Stamp the outcome and wake whoever is waiting. Idempotent in practice
    /// since a waiter list entry is only ever signalled once.
    pub fn fulfill(&self, outcome: Outcome<V>) {
        let mut slot = self.slot.lock();
        *slot = Some(outcome);
        self.ready.notify_all();
    }

    /// Block up to `timeout` for a result. Returns `None` on timeout — the
    /// caller must treat this as a liveness patch, not a failure, and simply
    /// re-dispatch.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome<V>> {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            self.ready.wait_for(&mut slot, timeout);
        }
        slot.take()
    }
}

/// A single caller's join onto an in-progress computation.
pub struct Waiter<V> {
    /// Uniquely identifies this join, mostly useful for diagnostics.
    pub id: WaiterId,
    /// The one-shot endpoint this waiter blocks on.
    pub signal: Arc<WaiterSignal<V>>,
}

impl<V> Clone for Waiter<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            signal: Arc::clone(&self.signal),
        }
    }
}

/// The tagged state of a single cache entry.
///
/// Deliberately a sum type with two live variants plus absence (a missing
/// row), not one struct discriminated by a field — `Running` and `Completed`
/// carry entirely different payloads and the type system should say so.
pub enum EntryState<V, C> {
    /// Exactly one runner is computing this key; `waiters` have joined it.
    Running {
        /// The runner that installed this entry.
        runner: RunnerId,
        /// Callers that joined the computation, in join order.
        waiters: Vec<Waiter<V>>,
    },
    /// A value is cached, alongside whatever context the strategy attached
    /// at insert time (TTL deadline, permanence flag, ...).
    Completed {
        /// The memoized value.
        value: V,
        /// Strategy-owned, opaque to the coordinator.
        context: C,
    },
}

impl<V: Clone, C: Clone> Clone for EntryState<V, C> {
    fn clone(&self) -> Self {
        match self {
            EntryState::Running { runner, waiters } => EntryState::Running {
                runner: *runner,
                waiters: waiters.clone(),
            },
            EntryState::Completed { value, context } => EntryState::Completed {
                value: value.clone(),
                context: context.clone(),
            },
        }
    }
}

/// A row as observed by a caller: the entry state plus the generation it was
/// read at. Every store mutation bumps the generation, so comparing
/// generations is all a compare-and-swap needs — no `PartialEq` bound on `V`
/// or `C` is required anywhere in the engine.
pub struct Row<V, C> {
    /// Monotonically increases on every mutation of this key's row.
    pub generation: u64,
    /// The entry state as of `generation`.
    pub state: Arc<EntryState<V, C>>,
}

impl<V, C> Clone for Row<V, C> {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            state: Arc::clone(&self.state),
        }
    }
}

impl<V, C> Row<V, C> {
    /// Wrap a freshly observed state at the given generation.
    pub fn new(generation: u64, state: EntryState<V, C>) -> Self {
        Self {
            generation,
            state: Arc::new(state),
        }
    }
}
