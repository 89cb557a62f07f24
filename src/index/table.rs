//! Index implementation
//!
//! BTreeMap-based index with RwLock for concurrency.

use std::collections::BTreeMap;

use bytes::Bytes;
use parking_lot::RwLock;

use super::{EntryInfo, IndexEntry};

/// In-memory index of live entries
#[derive(Debug, Default)]
pub struct MemIndex {
    data: RwLock<BTreeMap<String, IndexEntry>>,
}

impl MemIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key (read lock)
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.data.read().get(key).map(|entry| entry.value.clone())
    }

    /// Get the full entry by key
    pub fn entry(&self, key: &str) -> Option<IndexEntry> {
        self.data.read().get(key).cloned()
    }

    /// Insert or replace a value (write lock)
    pub fn insert(&self, key: String, entry: IndexEntry) {
        self.data.write().insert(key, entry);
    }

    /// Remove a key, returning whether it was present
    pub fn remove(&self, key: &str) -> bool {
        self.data.write().remove(key).is_some()
    }

    /// Size and modification time of a key
    pub fn info(&self, key: &str) -> Option<EntryInfo> {
        self.data.read().get(key).map(IndexEntry::info)
    }

    /// All keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// All key/value pairs in sorted key order
    pub fn entries(&self) -> Vec<(String, Bytes)> {
        self.data
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Copy of the whole index
    pub fn snapshot(&self) -> BTreeMap<String, IndexEntry> {
        self.data.read().clone()
    }

    /// Swap in a freshly replayed index
    pub fn replace(&self, entries: BTreeMap<String, IndexEntry>) {
        *self.data.write() = entries;
    }

    /// Move an entry to its flush time, unless it was overwritten since
    /// it was queued
    pub fn restamp(&self, key: &str, queued_at: u64, value: &Bytes, time: u64) -> bool {
        match self.data.write().get_mut(key) {
            Some(entry) if entry.time == queued_at && entry.value == *value => {
                entry.time = time;
                true
            }
            _ => false,
        }
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

/// True if two index states hold different keys or different bytes.
///
/// Timestamps are ignored: a value rewritten with identical bytes is not a
/// change from a reader's point of view.
pub(crate) fn values_differ(
    before: &BTreeMap<String, IndexEntry>,
    after: &BTreeMap<String, IndexEntry>,
) -> bool {
    before.len() != after.len()
        || before
            .iter()
            .zip(after.iter())
            .any(|((ka, a), (kb, b))| ka != kb || a.value != b.value)
}
