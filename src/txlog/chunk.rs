//! Chunk file layout
//!
//! Header encoding, chunk naming, frame packing and whole-chunk compression.

use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Extension identifying chunk files among the raw store's keys
pub const CHUNK_EXT: &str = ".chunk";

/// JSON header at the front of every chunk file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHeader {
    /// The payload after the header is gzip-compressed
    pub zipped: bool,
}

impl ChunkHeader {
    /// Encode as `[u32 LE length][JSON]`
    pub fn encode(&self) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let mut buf = Vec::with_capacity(4 + json.len());
        buf.extend_from_slice(&(json.len() as u32).to_le_bytes());
        buf.extend_from_slice(&json);
        Ok(buf)
    }
}

/// Split a chunk file into its header and (decompressed) frame payload
pub fn split_chunk(file: &str, bytes: &[u8]) -> Result<(ChunkHeader, Vec<u8>)> {
    let header_err = |reason: String| StoreError::ChunkHeader {
        file: file.to_string(),
        reason,
    };

    let len_bytes: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| header_err(format!("file too small ({} bytes)", bytes.len())))?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;

    let header_bytes = bytes
        .get(4..4 + header_len)
        .ok_or_else(|| header_err(format!("header length {header_len} exceeds file")))?;
    let header: ChunkHeader =
        serde_json::from_slice(header_bytes).map_err(|e| header_err(e.to_string()))?;

    let payload = &bytes[4 + header_len..];
    let payload = if header.zipped {
        gunzip(payload)?
    } else {
        payload.to_vec()
    };
    Ok((header, payload))
}

/// Gzip a buffer
pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(data, Compression::default());
    let mut out = Vec::new();
    encoder
        .read_to_end(&mut out)
        .map_err(|e| StoreError::Compression(format!("gzip failed: {e}")))?;
    Ok(out)
}

/// Gunzip a buffer
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| StoreError::Compression(format!("gunzip failed: {e}")))?;
    Ok(out)
}

/// Group encoded frames into chunks of at most `chunk_size` bytes.
///
/// A frame larger than `chunk_size` gets a chunk of its own. Never returns
/// an empty chunk.
pub fn pack_frames(frames: Vec<Vec<u8>>, chunk_size: usize) -> Vec<Vec<u8>> {
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let mut current: Vec<u8> = Vec::new();

    for frame in frames {
        if !current.is_empty() && current.len() + frame.len() > chunk_size {
            chunks.push(std::mem::take(&mut current));
        }
        current.extend_from_slice(&frame);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

// =============================================================================
// Chunk Naming
// =============================================================================

static CHUNK_SEQ: AtomicU64 = AtomicU64::new(0);
static WRITER_ID: OnceLock<u64> = OnceLock::new();

/// Random id of this process, embedded in every chunk name it creates
pub fn writer_id() -> u64 {
    *WRITER_ID.get_or_init(rand::random::<u64>)
}

/// Create a name no other writer can produce:
/// `{created_ms}_{seq}_{writer_id:016x}.chunk`
pub fn next_chunk_name(now_ms: u64) -> String {
    let seq = CHUNK_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}_{}_{:016x}{}", now_ms, seq, writer_id(), CHUNK_EXT)
}

pub fn is_chunk_file(key: &str) -> bool {
    key.ends_with(CHUNK_EXT)
}

/// Writer id embedded in a chunk name (0 for names we did not produce)
pub fn parse_writer_id(name: &str) -> u64 {
    name.strip_suffix(CHUNK_EXT)
        .and_then(|stem| stem.rsplit('_').next())
        .and_then(|id| u64::from_str_radix(id, 16).ok())
        .unwrap_or(0)
}
