//! In-memory tier: strict LRU bounded by entry count.
//!
//! Entries live in an [`IndexMap`] ordered from least to most recently
//! used. A hit moves the entry to the back; inserting past the bound
//! evicts from the front.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::key::CacheKey;

pub struct MemoryTier<T> {
    entries: Mutex<IndexMap<CacheKey, Arc<T>>>,
    capacity: usize,
}

impl<T> MemoryTier<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up `key`, marking it most recently used on a hit.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<T>> {
        let mut entries = self.entries.lock();
        let index = entries.get_index_of(key)?;
        let last = entries.len() - 1;
        entries.move_index(index, last);
        entries.get_index(last).map(|(_, value)| Arc::clone(value))
    }

    /// Insert as most recently used, evicting least recently used entries
    /// beyond the bound. Returns the evicted keys.
    pub fn insert(&self, key: CacheKey, value: Arc<T>) -> Vec<CacheKey> {
        let mut entries = self.entries.lock();
        entries.shift_remove(&key);
        entries.insert(key, value);

        let mut evicted = Vec::new();
        while entries.len() > self.capacity {
            match entries.shift_remove_index(0) {
                Some((key, _)) => evicted.push(key),
                None => break,
            }
        }
        evicted
    }

    /// Remove every entry whose key satisfies `predicate`.
    pub fn remove_where(&self, predicate: impl Fn(&CacheKey) -> bool) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !predicate(key));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.entries.lock().keys().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
