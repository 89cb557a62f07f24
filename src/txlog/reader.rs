//! Chunk Reader
//!
//! Recovers every decodable frame from a chunk file, skipping damaged
//! regions instead of giving up on the file.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::Result;

use super::chunk::{gunzip, split_chunk};
use super::codec::{decode_entry, FrameError, START_MAGIC};
use super::entry::{EntryValue, TransactionEntry};

/// Outcome of scanning one chunk file
#[derive(Debug, Default)]
pub struct ChunkScan {
    /// Entries recovered, in file order, with values decompressed
    pub entries: Vec<TransactionEntry>,

    /// Bytes skipped while hunting for the next START_MAGIC
    pub skipped_bytes: usize,

    /// Frames that started with START_MAGIC but failed to decode
    pub bad_frames: usize,
}

/// Parse a whole chunk file: header, optional gunzip, then the frame scan.
///
/// Fails only if the header (or whole-chunk compression) is unusable, in
/// which case the file contributes nothing.
pub fn read_chunk(file: &str, bytes: &[u8]) -> Result<ChunkScan> {
    let (_header, payload) = split_chunk(file, bytes)?;
    Ok(scan_frames(file, &payload))
}

/// Scan a frame payload, resynchronizing on START_MAGIC after any damage
pub fn scan_frames(file: &str, payload: &[u8]) -> ChunkScan {
    let mut scan = ChunkScan::default();
    let mut offset = 0;

    while offset < payload.len() {
        if !payload[offset..].starts_with(&START_MAGIC) {
            let start = offset;
            offset = find_start_magic(payload, offset).unwrap_or(payload.len());
            scan.skipped_bytes += offset - start;
            warn!(
                file,
                skipped = offset - start,
                at = start,
                total = payload.len(),
                recovered = scan.entries.len(),
                "Found bad bytes in chunk, skipping"
            );
            if offset >= payload.len() {
                break;
            }
        }

        match decode_entry(payload, offset) {
            Ok((entry, next)) => {
                offset = next;
                match inflate(entry) {
                    Some(entry) => scan.entries.push(entry),
                    None => scan.bad_frames += 1,
                }
            }
            Err(FrameError::Truncated { .. }) => {
                debug!(file, offset, "Frame runs past end of chunk, skipping a byte");
                scan.bad_frames += 1;
                offset += 1;
            }
            Err(e) => {
                warn!(file, offset, error = %e, "Failed to read frame, skipping a byte");
                scan.bad_frames += 1;
                offset += 1;
            }
        }
    }

    scan
}

fn find_start_magic(payload: &[u8], from: usize) -> Option<usize> {
    payload[from..]
        .windows(START_MAGIC.len())
        .position(|window| window == START_MAGIC)
        .map(|pos| from + pos)
}

/// Undo per-value compression; a value that fails to inflate is dropped
fn inflate(mut entry: TransactionEntry) -> Option<TransactionEntry> {
    if !entry.compressed {
        return Some(entry);
    }
    if let EntryValue::Value(compressed) = &entry.value {
        match gunzip(compressed) {
            Ok(raw) => entry.value = EntryValue::Value(Bytes::from(raw)),
            Err(e) => {
                warn!(key = %entry.key, error = %e, "Dropping entry with undecodable value");
                return None;
            }
        }
    }
    entry.compressed = false;
    Some(entry)
}
