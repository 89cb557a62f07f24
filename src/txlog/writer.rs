//! Chunk Writer
//!
//! Tracks the chunk file currently accepting appends.

use std::sync::atomic::{AtomicU64, Ordering};

use super::chunk::next_chunk_name;

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Current wall-clock time in unix millis
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Timestamp for one flush.
///
/// Strictly increasing within the process, so two flushes (from any store in
/// this process) never stamp the same key with the same time.
pub fn next_flush_stamp() -> u64 {
    let now = now_millis();
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let stamp = now.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, stamp, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return stamp,
            Err(actual) => last = actual,
        }
    }
}

#[derive(Debug, Clone)]
struct OpenChunk {
    name: String,
    size: usize,
    created_at: u64,
    header_written: bool,
}

/// Where the next append goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTarget {
    /// Chunk file name
    pub name: String,
    /// The file does not exist yet and must be created with a header first
    pub needs_header: bool,
}

/// Decides which chunk file receives appends
///
/// A chunk is closed once it has accumulated `chunk_size` bytes or is older
/// than `max_age_ms`; the next append then opens a fresh, uniquely named one.
#[derive(Debug)]
pub struct ChunkWriter {
    chunk_size: usize,
    max_age_ms: u64,
    current: Option<OpenChunk>,
}

impl ChunkWriter {
    pub fn new(chunk_size: usize, max_age_ms: u64) -> Self {
        Self {
            chunk_size,
            max_age_ms,
            current: None,
        }
    }

    /// Pick the chunk for an append of `len` bytes, opening a new one if
    /// the open chunk is too old or would grow past `chunk_size`
    pub fn target(&mut self, now: u64, len: usize) -> ChunkTarget {
        let full_or_expired = self.current.as_ref().is_some_and(|chunk| {
            now.saturating_sub(chunk.created_at) > self.max_age_ms
                || (chunk.size > 0 && chunk.size + len > self.chunk_size)
        });
        if full_or_expired {
            self.current = None;
        }

        let chunk = self.current.get_or_insert_with(|| OpenChunk {
            name: next_chunk_name(now),
            size: 0,
            created_at: now,
            header_written: false,
        });

        ChunkTarget {
            name: chunk.name.clone(),
            needs_header: !chunk.header_written,
        }
    }

    /// Record that the header of the current chunk is on disk
    pub fn header_written(&mut self) {
        if let Some(chunk) = self.current.as_mut() {
            chunk.header_written = true;
        }
    }

    /// Record `len` bytes appended to the current chunk
    pub fn record_append(&mut self, len: usize) {
        let Some(chunk) = self.current.as_mut() else {
            return;
        };
        chunk.size += len;
        if chunk.size >= self.chunk_size {
            self.current = None;
        }
    }

    /// Stop appending to the current chunk
    pub fn close(&mut self) {
        self.current = None;
    }

    /// Name of the chunk accepting appends, if any
    pub fn current_name(&self) -> Option<&str> {
        self.current.as_ref().map(|chunk| chunk.name.as_str())
    }
}
