//! Transaction entry definitions
//!
//! Defines the structure of individual log entries.

use bytes::Bytes;

/// The value carried by an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryValue {
    /// A live value
    Value(Bytes),

    /// A deletion marker
    Tombstone,
}

impl EntryValue {
    /// Borrow the live value, if any
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            EntryValue::Value(value) => Some(value),
            EntryValue::Tombstone => None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, EntryValue::Tombstone)
    }
}

/// A single entry in the transaction log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEntry {
    /// The key being written
    pub key: String,

    /// New value, or a tombstone
    pub value: EntryValue,

    /// Timestamp (unix millis) stamped at flush time
    pub time: u64,

    /// Whether `value` holds gzip-compressed bytes
    pub compressed: bool,
}

impl TransactionEntry {
    /// Create a put entry
    pub fn put(key: impl Into<String>, value: impl Into<Bytes>, time: u64) -> Self {
        Self {
            key: key.into(),
            value: EntryValue::Value(value.into()),
            time,
            compressed: false,
        }
    }

    /// Create a tombstone entry
    pub fn tombstone(key: impl Into<String>, time: u64) -> Self {
        Self {
            key: key.into(),
            value: EntryValue::Tombstone,
            time,
            compressed: false,
        }
    }
}
