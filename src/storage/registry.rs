//! Disk Registry
//!
//! Remembers the last observed stat of every chunk file so the resync
//! watcher can tell when another writer touched the store.

use std::collections::HashMap;

use crate::raw::RawInfo;

/// chunk file name → last observed stat
#[derive(Debug, Default, Clone)]
pub struct DiskRegistry {
    files: HashMap<String, RawInfo>,
}

impl DiskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current stat of a file we read or wrote
    pub fn observe(&mut self, file: &str, info: RawInfo) {
        self.files.insert(file.to_string(), info);
    }

    /// Stop tracking a file we deleted
    pub fn forget(&mut self, file: &str) {
        self.files.remove(file);
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, file: &str) -> bool {
        self.files.contains_key(file)
    }

    /// Compare a fresh listing (name, stat) against what we last saw.
    ///
    /// Any unknown file, vanished file, or differing stat counts as a change.
    pub fn has_changes(&self, observed: &[(String, Option<RawInfo>)]) -> bool {
        if observed.len() != self.files.len() {
            return true;
        }
        observed.iter().any(|(file, info)| match (self.files.get(file), info) {
            (Some(known), Some(info)) => known != info,
            _ => true,
        })
    }
}
