//! Log Replay
//!
//! Rebuilds the live key set by merging entries from every chunk file.
//! Entries may arrive in any file order; the greatest version wins.

use std::collections::{BTreeMap, HashMap};

use tracing::error;

use crate::index::IndexEntry;

use super::chunk::parse_writer_id;
use super::entry::{EntryValue, TransactionEntry};
use super::reader::read_chunk;

/// Ordering key of an entry.
///
/// Timestamps decide; on an identical millisecond the entry from the writer
/// with the greater instance id wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub time: u64,
    pub writer: u64,
}

/// Statistics of a replay
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Chunk files offered to the replay
    pub files: usize,

    /// Files ignored because their header was unusable
    pub unreadable_files: usize,

    /// Entries successfully decoded
    pub entries_recovered: usize,

    /// Frames that failed to decode
    pub entries_corrupted: usize,

    /// Garbage bytes skipped between frames
    pub skipped_bytes: usize,
}

/// Accumulates entries from chunk files
#[derive(Debug, Default)]
pub struct Replay {
    latest: HashMap<String, (Version, EntryValue)>,
    stats: RecoveryStats,
}

impl Replay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one chunk file and merge its entries
    ///
    /// An unusable header is logged and the file contributes nothing.
    pub fn add_chunk(&mut self, store: &str, file: &str, bytes: &[u8]) {
        self.stats.files += 1;
        let scan = match read_chunk(file, bytes) {
            Ok(scan) => scan,
            Err(e) => {
                error!(store, file, error = %e, "Failed to parse header of chunk file");
                self.stats.unreadable_files += 1;
                return;
            }
        };

        self.stats.entries_recovered += scan.entries.len();
        self.stats.entries_corrupted += scan.bad_frames;
        self.stats.skipped_bytes += scan.skipped_bytes;

        let writer = parse_writer_id(file);
        for entry in scan.entries {
            self.apply(entry, writer);
        }
    }

    /// Merge a single entry written by `writer`
    pub fn apply(&mut self, entry: TransactionEntry, writer: u64) {
        let version = Version {
            time: entry.time,
            writer,
        };
        match self.latest.get(&entry.key) {
            Some((existing, _)) if *existing > version => {}
            _ => {
                self.latest.insert(entry.key, (version, entry.value));
            }
        }
    }

    pub fn stats(&self) -> &RecoveryStats {
        &self.stats
    }

    /// Drop tombstones and return the live entries
    pub fn finish(self) -> (BTreeMap<String, IndexEntry>, RecoveryStats) {
        let live = self
            .latest
            .into_iter()
            .filter_map(|(key, (version, value))| match value {
                EntryValue::Value(value) => Some((key, IndexEntry::new(value, version.time))),
                EntryValue::Tombstone => None,
            })
            .collect();
        (live, self.stats)
    }
}
