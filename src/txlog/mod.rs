//! Transaction Log Module
//!
//! The on-disk format: framed entries grouped into chunk files.
//!
//! ## Responsibilities
//! - Encode/decode entries as magic-anchored frames
//! - Name, size and age-bound the chunk files that hold them
//! - Recover every intact frame from a damaged chunk
//! - Replay all chunks into the live key set (last write wins)
//!
//! ## Chunk File Format
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │ Header                                          │
//! │ ┌────────────────┬────────────────────────────┐ │
//! │ │ HeaderLen (4)  │ JSON {"zipped": bool}      │ │
//! │ └────────────────┴────────────────────────────┘ │
//! ├─────────────────────────────────────────────────┤
//! │ Payload (gzip-compressed when zipped)           │
//! │ ┌───────┬─────────────────────────────┬───────┐ │
//! │ │ START │ lens | time | flags | k | v │  END  │ │
//! │ └───────┴─────────────────────────────┴───────┘ │
//! │ ... repeated for each frame                     │
//! └─────────────────────────────────────────────────┘
//! ```

mod chunk;
mod codec;
mod entry;
mod reader;
mod recovery;
mod writer;

pub use chunk::{
    gunzip, gzip, is_chunk_file, next_chunk_name, pack_frames, parse_writer_id, split_chunk,
    writer_id, ChunkHeader, CHUNK_EXT,
};
pub use codec::{decode_entry, encode_entry, encoded_len, FrameError, END_MAGIC, FRAME_OVERHEAD, START_MAGIC};
pub use entry::{EntryValue, TransactionEntry};
pub use reader::{read_chunk, scan_frames, ChunkScan};
pub use recovery::{RecoveryStats, Replay, Version};
pub use writer::{next_flush_stamp, now_millis, ChunkTarget, ChunkWriter};
