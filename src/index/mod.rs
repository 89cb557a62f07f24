//! Index Module
//!
//! In-memory map from key to its most recent live value.
//!
//! ## Responsibilities
//! - Serve every read without touching the raw store
//! - Reflect writes synchronously, before any I/O is issued
//! - Be replaced wholesale after a replay (startup, resync, compaction)
//!
//! ## Data Structure Choice
//! BTreeMap behind a RwLock:
//! - Sorted key enumeration for free
//! - Cheap snapshots for resync change detection
//! - Tombstones never live here; a removed key is simply absent

mod table;

pub use table::MemIndex;
pub(crate) use table::values_differ;

use bytes::Bytes;

/// Live value held by the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// The value bytes
    pub value: Bytes,

    /// When the value was written (unix millis)
    pub time: u64,
}

impl IndexEntry {
    pub fn new(value: Bytes, time: u64) -> Self {
        Self { value, time }
    }

    /// Stat view of this entry
    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            size: self.value.len(),
            last_modified: self.time,
        }
    }
}

/// Size and modification time of a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    pub size: usize,
    pub last_modified: u64,
}
