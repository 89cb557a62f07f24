//! Frame codec
//!
//! Serializes one transaction entry into a self-delimiting frame and back.
//!
//! ```text
//! ┌───────────┬──────────┬──────────┬──────────┬───────┬─────┬───────┬───────────┐
//! │ START (8) │KeyLen (4)│ValLen (4)│ Time (8) │Flags 1│ Key │ Value │  END (8)  │
//! └───────────┴──────────┴──────────┴──────────┴───────┴─────┴───────┴───────────┘
//! ```
//!
//! Lengths are u32 LE, time is f64 LE (unix millis). Flags: bit 0 = value is
//! gzip-compressed, bit 1 = tombstone.

use bytes::Bytes;
use thiserror::Error;

use super::entry::{EntryValue, TransactionEntry};

/// Anchor opening every frame
pub const START_MAGIC: [u8; 8] = [236, 49, 112, 121, 27, 127, 227, 63];

/// Anchor closing every frame
pub const END_MAGIC: [u8; 8] = [220, 111, 243, 202, 200, 79, 213, 63];

/// Bytes of a frame that do not depend on key/value size
pub const FRAME_OVERHEAD: usize = 8 + 4 + 4 + 8 + 1 + 8;

const FLAG_COMPRESSED: u8 = 0b01;
const FLAG_TOMBSTONE: u8 = 0b10;

/// Why a frame could not be decoded
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("read past end of buffer at offset {offset}/{len}")]
    Truncated { offset: usize, len: usize },

    #[error("start magic mismatch")]
    BadStartMagic,

    #[error("end magic mismatch")]
    BadEndMagic,

    #[error("key is not valid UTF-8")]
    InvalidKey,

    #[error("invalid timestamp {0}")]
    InvalidTime(f64),

    #[error("{0} is too large to frame")]
    TooLarge(&'static str),
}

/// Exact encoded size of an entry
pub fn encoded_len(entry: &TransactionEntry) -> usize {
    FRAME_OVERHEAD + entry.key.len() + entry.value.as_bytes().map_or(0, |v| v.len())
}

/// Serialize an entry into a frame
pub fn encode_entry(entry: &TransactionEntry) -> Result<Vec<u8>, FrameError> {
    let key = entry.key.as_bytes();
    let value: &[u8] = entry.value.as_bytes().map_or(&[], |v| v.as_ref());

    let key_len = u32::try_from(key.len()).map_err(|_| FrameError::TooLarge("key"))?;
    let value_len = u32::try_from(value.len()).map_err(|_| FrameError::TooLarge("value"))?;

    let mut flags = 0u8;
    if entry.compressed {
        flags |= FLAG_COMPRESSED;
    }
    if entry.value.is_tombstone() {
        flags |= FLAG_TOMBSTONE;
    }

    let mut buf = Vec::with_capacity(encoded_len(entry));
    buf.extend_from_slice(&START_MAGIC);
    buf.extend_from_slice(&key_len.to_le_bytes());
    buf.extend_from_slice(&value_len.to_le_bytes());
    buf.extend_from_slice(&(entry.time as f64).to_le_bytes());
    buf.push(flags);
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    buf.extend_from_slice(&END_MAGIC);
    Ok(buf)
}

/// Cursor over a byte slice that fails with `Truncated` instead of panicking
struct Cursor<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, count: usize) -> Result<&'a [u8], FrameError> {
        let end = self
            .offset
            .checked_add(count)
            .filter(|&end| end <= self.buf.len())
            .ok_or(FrameError::Truncated {
                offset: self.offset,
                len: self.buf.len(),
            })?;
        let slice = &self.buf[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], FrameError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

/// Decode the frame starting at `offset`.
///
/// Returns the entry and the offset just past its END_MAGIC.
pub fn decode_entry(buf: &[u8], offset: usize) -> Result<(TransactionEntry, usize), FrameError> {
    let mut cursor = Cursor { buf, offset };

    if cursor.take_array::<8>()? != START_MAGIC {
        return Err(FrameError::BadStartMagic);
    }

    let key_len = u32::from_le_bytes(cursor.take_array()?) as usize;
    let value_len = u32::from_le_bytes(cursor.take_array()?) as usize;
    let time = f64::from_le_bytes(cursor.take_array()?);
    let [flags] = cursor.take_array::<1>()?;

    let key = cursor.take(key_len)?;
    let value = cursor.take(value_len)?;

    if cursor.take_array::<8>()? != END_MAGIC {
        return Err(FrameError::BadEndMagic);
    }

    if !time.is_finite() || time < 0.0 {
        return Err(FrameError::InvalidTime(time));
    }
    let key = std::str::from_utf8(key).map_err(|_| FrameError::InvalidKey)?;

    let value = if flags & FLAG_TOMBSTONE != 0 {
        EntryValue::Tombstone
    } else {
        EntryValue::Value(Bytes::copy_from_slice(value))
    };

    let entry = TransactionEntry {
        key: key.to_string(),
        value,
        time: time as u64,
        compressed: flags & FLAG_COMPRESSED != 0,
    };
    Ok((entry, cursor.offset))
}
