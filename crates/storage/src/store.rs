//! The two backing-store variants: in-memory and process-global
//!
//! Both expose the same atomic primitives the coordinator and the cache
//! strategies rely on. The in-memory variant enforces full-row
//! compare-and-swap via the row generation; the persistent variant performs
//! coarser put-or-erase, which is sound because every caller already treats
//! a failed CAS as a lost race and re-dispatches rather than trusting it
//! blindly (see the coordinator's retry-everywhere design).

use std::any::Any;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::row::{EntryState, Row};

/// Rough per-entry byte estimate used for the Eviction strategy's
/// `used_bytes` accounting. A coarse constant is explicitly sanctioned by the
/// design ("map_count × average_entry_size") over a precise byte counter.
pub const AVG_ENTRY_BYTES: u64 = 128;

/// The atomic operations every backing-store variant must provide.
///
/// `K` is always [`memo_core::CanonicalKey`] in practice, but the trait stays
/// generic so storage tests can exercise it with plain keys.
pub trait BackingStore<K, V, C> {
    /// Insert a brand-new row if (and only if) the key is currently absent.
    /// Returns the row as inserted, or `None` if something was already there.
    fn insert_if_absent(&self, key: K, state: EntryState<V, C>) -> Option<Row<V, C>>;

    /// Replace the row at `key` with `new_state`, provided its current
    /// generation still matches `expected_generation`. Returns the new row
    /// on success, `None` on a lost race.
    fn replace_if_equal(
        &self,
        key: &K,
        expected_generation: u64,
        new_state: EntryState<V, C>,
    ) -> Option<Row<V, C>>;

    /// Remove the row at `key`, provided its generation still matches.
    /// Returns whether the delete took effect.
    fn delete_if_equal(&self, key: &K, expected_generation: u64) -> bool;

    /// Read the current row, if any.
    fn lookup(&self, key: &K) -> Option<Row<V, C>>;

    /// Delete every row matching `predicate`, returning the count removed.
    /// The bulk primitive invalidation and GC are built on.
    fn select_delete<F>(&self, predicate: F) -> usize
    where
        F: Fn(&K, &EntryState<V, C>) -> bool;

    /// Number of rows currently stored.
    fn len(&self) -> usize;

    /// Whether the store currently holds no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The in-memory, process-lifetime backing store (the "primary" variant).
pub struct MemoryStore<K, V, C> {
    table: DashMap<K, Row<V, C>>,
}

impl<K, V, C> Default for MemoryStore<K, V, C>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C> MemoryStore<K, V, C>
where
    K: Eq + Hash,
{
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            table: DashMap::new(),
        }
    }
}

impl<K, V, C> BackingStore<K, V, C> for MemoryStore<K, V, C>
where
    K: Eq + Hash + Clone,
{
    fn insert_if_absent(&self, key: K, state: EntryState<V, C>) -> Option<Row<V, C>> {
        use dashmap::mapref::entry::Entry;
        match self.table.entry(key) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let row = Row::new(0, state);
                vacant.insert(row.clone());
                Some(row)
            }
        }
    }

    fn replace_if_equal(
        &self,
        key: &K,
        expected_generation: u64,
        new_state: EntryState<V, C>,
    ) -> Option<Row<V, C>> {
        let mut slot = self.table.get_mut(key)?;
        if slot.generation != expected_generation {
            return None;
        }
        let new_row = Row::new(expected_generation.wrapping_add(1), new_state);
        *slot = new_row.clone();
        Some(new_row)
    }

    fn delete_if_equal(&self, key: &K, expected_generation: u64) -> bool {
        self.table
            .remove_if(key, |_, row| row.generation == expected_generation)
            .is_some()
    }

    fn lookup(&self, key: &K) -> Option<Row<V, C>> {
        self.table.get(key).map(|r| r.clone())
    }

    fn select_delete<F>(&self, predicate: F) -> usize
    where
        F: Fn(&K, &EntryState<V, C>) -> bool,
    {
        let matching: Vec<K> = self
            .table
            .iter()
            .filter(|entry| predicate(entry.key(), &entry.value().state))
            .map(|entry| entry.key().clone())
            .collect();
        let mut count = 0;
        for key in matching {
            if self.table.remove(&key).is_some() {
                count += 1;
            }
        }
        count
    }

    fn len(&self) -> usize {
        self.table.len()
    }
}

type AnyTable = Box<dyn Any + Send + Sync>;
static PERSISTENT_REGISTRY: Lazy<DashMap<&'static str, AnyTable>> = Lazy::new(DashMap::new);

/// The process-global named-value store (the "persistent" variant).
///
/// Named stores are looked up in a process-wide registry keyed by a static
/// name, so every `PersistentStore::named("x")` for a given key/value type in
/// the process shares the same underlying table — the defining property of a
/// global named-value store. CAS here is coarse: replace and delete always
/// succeed if the row exists, since this variant only needs to support
/// put-or-erase atomicity per the design.
pub struct PersistentStore<K, V, C> {
    table: Arc<DashMap<K, Row<V, C>>>,
}

impl<K, V, C> PersistentStore<K, V, C>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    /// Look up (creating if needed) the named global table for this
    /// key/value/context type.
    ///
    /// # Panics
    ///
    /// Panics if `name` was already registered with a different `(K, V, C)`
    /// instantiation — reusing a name across incompatible types is a
    /// programming error, not a runtime condition to recover from.
    pub fn named(name: &'static str) -> Self {
        let boxed = PERSISTENT_REGISTRY.entry(name).or_insert_with(|| {
            debug!(name, "registering new persistent store table");
            Box::new(Arc::new(DashMap::<K, Row<V, C>>::new())) as AnyTable
        });
        let table = boxed
            .downcast_ref::<Arc<DashMap<K, Row<V, C>>>>()
            .expect("persistent store name reused with a different key/value type")
            .clone();
        Self { table }
    }
}

impl<K, V, C> BackingStore<K, V, C> for PersistentStore<K, V, C>
where
    K: Eq + Hash + Clone,
{
    fn insert_if_absent(&self, key: K, state: EntryState<V, C>) -> Option<Row<V, C>> {
        use dashmap::mapref::entry::Entry;
        match self.table.entry(key) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let row = Row::new(0, state);
                vacant.insert(row.clone());
                Some(row)
            }
        }
    }

    fn replace_if_equal(
        &self,
        key: &K,
        expected_generation: u64,
        new_state: EntryState<V, C>,
    ) -> Option<Row<V, C>> {
        let new_row = Row::new(expected_generation.wrapping_add(1), new_state);
        self.table.insert(key.clone(), new_row.clone());
        Some(new_row)
    }

    fn delete_if_equal(&self, key: &K, _expected_generation: u64) -> bool {
        self.table.remove(key).is_some()
    }

    fn lookup(&self, key: &K) -> Option<Row<V, C>> {
        self.table.get(key).map(|r| r.clone())
    }

    fn select_delete<F>(&self, predicate: F) -> usize
    where
        F: Fn(&K, &EntryState<V, C>) -> bool,
    {
        let matching: Vec<K> = self
            .table
            .iter()
            .filter(|entry| predicate(entry.key(), &entry.value().state))
            .map(|entry| entry.key().clone())
            .collect();
        let mut count = 0;
        for key in matching {
            if self.table.remove(&key).is_some() {
                count += 1;
            }
        }
        count
    }

    fn len(&self) -> usize {
        self.table.len()
    }
}

/// Either backing-store variant behind one concrete type, so a cache
/// strategy or the coordinator can hold "whichever one it was configured
/// with" without a trait object.
pub enum StoreHandle<K, V, C> {
    /// The in-memory, process-lifetime variant.
    Memory(Arc<MemoryStore<K, V, C>>),
    /// The process-global named-value variant.
    Persistent(Arc<PersistentStore<K, V, C>>),
}

impl<K, V, C> Clone for StoreHandle<K, V, C> {
    fn clone(&self) -> Self {
        match self {
            StoreHandle::Memory(s) => StoreHandle::Memory(Arc::clone(s)),
            StoreHandle::Persistent(s) => StoreHandle::Persistent(Arc::clone(s)),
        }
    }
}

impl<K, V, C> StoreHandle<K, V, C>
where
    K: Eq + Hash + Clone,
{
    /// A coarse byte-usage estimate: entry count times a fixed average size.
    pub fn approx_bytes(&self) -> u64 {
        (self.len() as u64).saturating_mul(AVG_ENTRY_BYTES)
    }
}

impl<K, V, C> BackingStore<K, V, C> for StoreHandle<K, V, C>
where
    K: Eq + Hash + Clone,
{
    fn insert_if_absent(&self, key: K, state: EntryState<V, C>) -> Option<Row<V, C>> {
        match self {
            StoreHandle::Memory(s) => s.insert_if_absent(key, state),
            StoreHandle::Persistent(s) => s.insert_if_absent(key, state),
        }
    }

    fn replace_if_equal(
        &self,
        key: &K,
        expected_generation: u64,
        new_state: EntryState<V, C>,
    ) -> Option<Row<V, C>> {
        match self {
            StoreHandle::Memory(s) => s.replace_if_equal(key, expected_generation, new_state),
            StoreHandle::Persistent(s) => s.replace_if_equal(key, expected_generation, new_state),
        }
    }

    fn delete_if_equal(&self, key: &K, expected_generation: u64) -> bool {
        match self {
            StoreHandle::Memory(s) => s.delete_if_equal(key, expected_generation),
            StoreHandle::Persistent(s) => s.delete_if_equal(key, expected_generation),
        }
    }

    fn lookup(&self, key: &K) -> Option<Row<V, C>> {
        match self {
            StoreHandle::Memory(s) => s.lookup(key),
            StoreHandle::Persistent(s) => s.lookup(key),
        }
    }

    fn select_delete<F>(&self, predicate: F) -> usize
    where
        F: Fn(&K, &EntryState<V, C>) -> bool,
    {
        match self {
            StoreHandle::Memory(s) => s.select_delete(predicate),
            StoreHandle::Persistent(s) => s.select_delete(predicate),
        }
    }

    fn len(&self) -> usize {
        match self {
            StoreHandle::Memory(s) => s.len(),
            StoreHandle::Persistent(s) => s.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(v: i32) -> EntryState<i32, ()> {
        EntryState::Completed {
            value: v,
            context: (),
        }
    }

    fn running(runner: u64) -> EntryState<i32, ()> {
        EntryState::Running {
            runner,
            waiters: Vec::new(),
        }
    }

    #[test]
    fn insert_if_absent_only_succeeds_once() {
        let store: MemoryStore<&str, i32, ()> = MemoryStore::new();
        assert!(store.insert_if_absent("k", running(1)).is_some());
        assert!(store.insert_if_absent("k", running(2)).is_none());
    }

    #[test]
    fn replace_if_equal_requires_current_generation() {
        let store: MemoryStore<&str, i32, ()> = MemoryStore::new();
        let row = store.insert_if_absent("k", running(1)).unwrap();
        assert!(store
            .replace_if_equal("k", row.generation + 1, completed(42))
            .is_none());
        let replaced = store
            .replace_if_equal("k", row.generation, completed(42))
            .unwrap();
        assert!(matches!(&*replaced.state, EntryState::Completed { value, .. } if *value == 42));
    }

    #[test]
    fn delete_if_equal_requires_current_generation() {
        let store: MemoryStore<&str, i32, ()> = MemoryStore::new();
        let row = store.insert_if_absent("k", running(1)).unwrap();
        assert!(!store.delete_if_equal("k", row.generation + 1));
        assert!(store.delete_if_equal("k", row.generation));
        assert!(store.lookup(&"k").is_none());
    }

    #[test]
    fn select_delete_removes_matching_rows_only() {
        let store: MemoryStore<&str, i32, ()> = MemoryStore::new();
        store.insert_if_absent("a", completed(1)).unwrap();
        store.insert_if_absent("b", completed(2)).unwrap();
        store.insert_if_absent("c", running(1)).unwrap();

        let removed = store.select_delete(|_, state| matches!(state, EntryState::Completed { .. }));
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn persistent_store_shares_state_across_handles_with_the_same_name() {
        let a: PersistentStore<&str, i32, ()> = PersistentStore::named("test::shared");
        let b: PersistentStore<&str, i32, ()> = PersistentStore::named("test::shared");
        a.insert_if_absent("k", completed(7)).unwrap();
        let seen = b.lookup(&"k").unwrap();
        assert!(matches!(&*seen.state, EntryState::Completed { value, .. } if *value == 7));
    }

    #[test]
    fn persistent_store_replace_is_coarse_and_always_succeeds() {
        let store: PersistentStore<&str, i32, ()> = PersistentStore::named("test::coarse");
        let row = store.insert_if_absent("k", running(1)).unwrap();
        // A deliberately wrong expected generation still succeeds: the
        // persistent variant's CAS is coarse by design.
        assert!(store
            .replace_if_equal("k", row.generation + 99, completed(1))
            .is_some());
    }
}
