use std::hash::Hash;

use indexmap::map::Entry;
use indexmap::IndexMap;

use crate::promise::Promise;

/// Insertion-ordered set of loads waiting for the next dispatch. Not
/// synchronized on its own; the loader serializes access under its
/// core mutex and drains it in one swap.
pub(crate) struct PendingBuffer<K, T> {
    entries: IndexMap<K, Promise<T>>,
}

impl<K: Hash + Eq, T> Default for PendingBuffer<K, T> {
    fn default() -> Self {
        PendingBuffer { entries: IndexMap::new() }
    }
}

impl<K: Hash + Eq, T> PendingBuffer<K, T> {
    /// Inserts only if `key` is absent. Returns whether the insert
    /// happened; a refused key keeps the promise that arrived first.
    pub(crate) fn try_add(&mut self, key: K, promise: Promise<T>) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(promise);
                true
            }
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<&Promise<T>> {
        self.entries.get(key)
    }

    /// Keys in insertion order.
    pub(crate) fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
