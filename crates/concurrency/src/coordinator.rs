//! The state-machine owner: `Engine::get_or_run`
//!
//! Every transition the dispatch loop makes is a single compare-and-swap on a
//! full row, so a caller that loses a race never corrupts anything — it just
//! re-reads the fresh state and re-enters the loop. The only suspension point
//! is a waiter's bounded wait on its own signal; everything else busy-retries.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use memo_core::{
    normalize, CacheSelection, CallOptions, CanonicalKey, GetOrRunError, RawKey, Settings,
};
use memo_storage::{
    next_runner_id, next_waiter_id, BackingStore, EntryState, Outcome, RunnerId, StoreHandle,
    Waiter, WaiterSignal,
};

use tracing::{debug, warn};

use crate::strategy::{CacheStrategy, NewFromStore, ReadOutcome};

/// A waiter's bound on how long it parks behind a running computation before
/// giving up and re-dispatching. Not a failure signal — just a liveness patch.
pub const WAITER_TIMEOUT_MS: u64 = 5_000;

/// A concurrent memoization engine over values of type `V`, running one
/// pluggable [`CacheStrategy`] `S` across both the primary (in-memory) and
/// persistent (process-global named) backing stores.
pub struct Engine<V, S: CacheStrategy<V>> {
    settings: Settings,
    primary_store: StoreHandle<CanonicalKey, V, S::Context>,
    primary_strategy: S,
    persistent_store: StoreHandle<CanonicalKey, V, S::Context>,
    persistent_strategy: S,
}

impl<V, S> Engine<V, S>
where
    V: Clone + Send + Sync + 'static,
    S: NewFromStore<V>,
{
    /// Build a new engine. `persistent_name` is the registry key under which
    /// this engine's persistent variant shares state with any other engine
    /// instance that names the same key and value types.
    pub fn new(persistent_name: &'static str, settings: Settings) -> Self {
        let primary_store = StoreHandle::Memory(Arc::new(memo_storage::MemoryStore::new()));
        let persistent_store =
            StoreHandle::Persistent(Arc::new(memo_storage::PersistentStore::named(
                persistent_name,
            )));
        let primary_strategy = S::new_over(primary_store.clone(), &settings);
        let persistent_strategy = S::new_over(persistent_store.clone(), &settings);
        Self {
            settings,
            primary_store,
            primary_strategy,
            persistent_store,
            persistent_strategy,
        }
    }
}

impl<V, S> Engine<V, S>
where
    V: Clone + Send + Sync + 'static,
    S: CacheStrategy<V>,
{
    /// Compute (or fetch the memoized result for) `key`, invoking `thunk` at
    /// most once per completed cache lifetime.
    ///
    /// `thunk` must be re-callable rather than one-shot: a thunk result that
    /// is immediately invalidated by its own strategy (e.g. `expires_in = 0`)
    /// causes the dispatch loop to land back on the absent branch, which runs
    /// `thunk` again exactly as a fresh caller would.
    pub fn get_or_run<K, F, E>(
        &self,
        key: K,
        opts: CallOptions,
        thunk: F,
    ) -> Result<V, GetOrRunError<E>>
    where
        K: Into<RawKey>,
        F: Fn() -> Result<V, E>,
    {
        let canonical = normalize(&key.into());
        let (store, strategy) = match opts.cache {
            CacheSelection::Primary => (&self.primary_store, &self.primary_strategy),
            CacheSelection::Persistent => (&self.persistent_store, &self.persistent_strategy),
        };
        dispatch(
            store,
            strategy,
            &canonical,
            &opts,
            self.settings.max_waiters(),
            Duration::from_millis(self.settings.waiter_sleep_ms),
            &thunk,
        )
    }

    /// The settings this engine was constructed with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The primary (in-memory) strategy instance, for invalidation/GC use.
    pub fn primary_strategy(&self) -> &S {
        &self.primary_strategy
    }

    /// The persistent (named-store) strategy instance, for invalidation/GC use.
    pub fn persistent_strategy(&self) -> &S {
        &self.persistent_strategy
    }
}

fn dispatch<V, S, F, E>(
    store: &StoreHandle<CanonicalKey, V, S::Context>,
    strategy: &S,
    key: &CanonicalKey,
    opts: &CallOptions,
    max_waiters: usize,
    waiter_sleep: Duration,
    thunk: &F,
) -> Result<V, GetOrRunError<E>>
where
    S: CacheStrategy<V>,
    V: Clone + Send + Sync + 'static,
    F: Fn() -> Result<V, E>,
{
    loop {
        match store.lookup(key) {
            None => {
                let runner_id = next_runner_id();
                let inserted = store.insert_if_absent(
                    key.clone(),
                    EntryState::Running {
                        runner: runner_id,
                        waiters: Vec::new(),
                    },
                );
                match inserted {
                    Some(_row) => match run_as_runner(store, strategy, key, opts, runner_id, thunk)
                    {
                        Ok(()) => continue,
                        Err(e) => return Err(GetOrRunError::Thunk(e)),
                    },
                    None => continue,
                }
            }
            Some(row) => match &*row.state {
                EntryState::Running { runner, waiters } => {
                    if waiters.len() < max_waiters {
                        let signal = Arc::new(WaiterSignal::new());
                        let mut next_waiters = waiters.clone();
                        next_waiters.push(Waiter {
                            id: next_waiter_id(),
                            signal: Arc::clone(&signal),
                        });
                        let replaced = store.replace_if_equal(
                            key,
                            row.generation,
                            EntryState::Running {
                                runner: *runner,
                                waiters: next_waiters,
                            },
                        );
                        if replaced.is_some() {
                            // The outcome payload is deliberately ignored: a
                            // woken waiter re-dispatches and lets the
                            // Completed/absent branch decide, rather than
                            // trusting a notification it can no longer prove
                            // is still current.
                            let _ = signal.wait_timeout(Duration::from_millis(WAITER_TIMEOUT_MS));
                        }
                        continue;
                    } else {
                        thread::sleep(waiter_sleep);
                        continue;
                    }
                }
                EntryState::Completed { value, context } => {
                    match strategy.on_read(key, value, context) {
                        ReadOutcome::Ok => return Ok(value.clone()),
                        ReadOutcome::Retry => continue,
                    }
                }
            },
        }
    }
}

/// Run `thunk` as the runner that just installed `key`'s `Running` row.
///
/// `RunnerGuard` stands in for the spec's liveness watch: if `thunk` panics,
/// the guard's `Drop` clears the row and fails every waiter as the unwind
/// passes through, the same outcome a cross-thread death monitor would
/// produce, without needing one.
fn run_as_runner<V, S, F, E>(
    store: &StoreHandle<CanonicalKey, V, S::Context>,
    strategy: &S,
    key: &CanonicalKey,
    opts: &CallOptions,
    runner_id: RunnerId,
    thunk: &F,
) -> Result<(), E>
where
    S: CacheStrategy<V>,
    V: Clone + Send + Sync + 'static,
    F: Fn() -> Result<V, E>,
{
    let guard = RunnerGuard::new(store.clone(), key.clone(), runner_id);
    match thunk() {
        Ok(value) => {
            let context = strategy.on_cache(key, &value, opts);
            complete_running(store, key, runner_id, value, context);
            guard.disarm();
            Ok(())
        }
        Err(e) => {
            debug!(runner_id, "thunk failed, clearing row and failing waiters");
            fail_running(store, key, runner_id);
            guard.disarm();
            Err(e)
        }
    }
}

fn complete_running<V, C>(
    store: &StoreHandle<CanonicalKey, V, C>,
    key: &CanonicalKey,
    runner_id: RunnerId,
    value: V,
    context: C,
) where
    V: Clone,
    C: Clone,
{
    loop {
        let row = match store.lookup(key) {
            Some(row) => row,
            None => return,
        };
        match &*row.state {
            EntryState::Running { runner, waiters } if *runner == runner_id => {
                let waiters = waiters.clone();
                let replaced = store.replace_if_equal(
                    key,
                    row.generation,
                    EntryState::Completed {
                        value: value.clone(),
                        context: context.clone(),
                    },
                );
                if replaced.is_some() {
                    for waiter in &waiters {
                        waiter.signal.fulfill(Outcome::Completed(value.clone()));
                    }
                    return;
                }
                // Another waiter joined between our lookup and this replace;
                // the row we hold is stale. Retry with the fresh one.
            }
            _ => return,
        }
    }
}

fn fail_running<V, C>(store: &StoreHandle<CanonicalKey, V, C>, key: &CanonicalKey, runner_id: RunnerId) {
    loop {
        let row = match store.lookup(key) {
            Some(row) => row,
            None => return,
        };
        match &*row.state {
            EntryState::Running { runner, waiters } if *runner == runner_id => {
                let waiters = waiters.clone();
                if store.delete_if_equal(key, row.generation) {
                    for waiter in &waiters {
                        waiter.signal.fulfill(Outcome::Failed);
                    }
                    return;
                }
            }
            _ => return,
        }
    }
}

/// Clears a runner's `Running` row and fails its waiters if dropped while
/// still armed — i.e. if the runner's thunk panics instead of returning.
struct RunnerGuard<V, C> {
    store: StoreHandle<CanonicalKey, V, C>,
    key: CanonicalKey,
    runner_id: RunnerId,
    armed: bool,
}

impl<V, C> RunnerGuard<V, C> {
    fn new(store: StoreHandle<CanonicalKey, V, C>, key: CanonicalKey, runner_id: RunnerId) -> Self {
        Self {
            store,
            key,
            runner_id,
            armed: true,
        }
    }

    /// Disarm after a clean completion or failure; nothing left to clean up.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<V, C> Drop for RunnerGuard<V, C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(
            runner_id = self.runner_id,
            "runner dropped without completing or failing cleanly; clearing its row"
        );
        loop {
            let row = match self.store.lookup(&self.key) {
                Some(row) => row,
                None => return,
            };
            match &*row.state {
                EntryState::Running { runner, waiters } if *runner == self.runner_id => {
                    let waiters = waiters.clone();
                    if self.store.delete_if_equal(&self.key, row.generation) {
                        for waiter in &waiters {
                            waiter.signal.fulfill(Outcome::Failed);
                        }
                        return;
                    }
                }
                _ => return,
            }
        }
    }
}
