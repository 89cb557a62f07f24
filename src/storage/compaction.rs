//! Log compaction
//!
//! Rewrites the durable live entries of a store into new chunk files and
//! deletes the files they replace.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, instrument, warn};

use crate::engine::StoreInner;
use crate::error::{Result, StoreError};
use crate::txlog::{
    encode_entry, gzip, next_chunk_name, now_millis, pack_frames, ChunkHeader, TransactionEntry,
};

/// Holds the per-store compaction flag for the duration of a run
struct CompactionGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> CompactionGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for CompactionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl StoreInner {
    /// Compact if `force` is set or the policy says the log is due.
    ///
    /// Must run on the sequencer. Returns true if a compaction completed,
    /// false if none was due or one was already running.
    #[instrument(skip(self), fields(store = %self.config.name))]
    pub(crate) async fn maybe_compact(&self, force: bool) -> Result<bool> {
        let Some(_guard) = CompactionGuard::acquire(&self.compacting) else {
            debug!(store = %self.config.name, "Compaction already running");
            return Ok(false);
        };

        let files = self.chunk_files().await?;
        let entry_count = self.entry_count.load(Ordering::SeqCst);
        let live_keys = self.index.len();
        let due = self
            .config
            .compaction
            .is_due(entry_count, live_keys, files.len());
        if !force && !due {
            return Ok(false);
        }

        info!(
            store = %self.config.name,
            entries = entry_count,
            keys = live_keys,
            files = files.len(),
            force,
            "Compacting transaction log"
        );

        // Pending writes are not part of the rewrite; they land afterwards
        // through the normal flush path.
        let loaded = self.load_all().await?;

        let mut frames = Vec::with_capacity(loaded.durable.len());
        for (key, live) in &loaded.durable {
            let entry = self.compress_value(TransactionEntry::put(
                key.clone(),
                live.value.clone(),
                live.time,
            ))?;
            frames.push(encode_entry(&entry)?);
        }

        let mut written = Vec::new();
        for chunk in pack_frames(frames, self.config.chunk_size) {
            let name = next_chunk_name(now_millis());
            let header = ChunkHeader {
                zipped: chunk.len() >= self.config.file_zip_threshold,
            };

            let mut contents = header.encode()?;
            if header.zipped {
                contents.extend_from_slice(&gzip(&chunk)?);
            } else {
                contents.extend_from_slice(&chunk);
            }

            self.raw.set(&name, &contents).await?;
            let readback = self.raw.get(&name).await?;
            if readback.as_deref() != Some(contents.as_slice()) {
                error!(
                    store = %self.config.name,
                    file = %name,
                    "Compacted chunk did not read back intact, keeping old chunks"
                );
                return Err(StoreError::VerificationFailed {
                    store: self.config.name.clone(),
                    file: name,
                });
            }
            written.push(name);
        }

        // New flushes must not append to a chunk we are about to delete
        self.writer.lock().close();

        let mut removed = 0;
        for file in &loaded.files {
            match self.raw.remove(file).await {
                Ok(()) => {
                    removed += 1;
                    self.registry.lock().forget(file);
                }
                Err(e) => {
                    warn!(store = %self.config.name, file = %file, error = %e, "Failed to remove compacted chunk");
                }
            }
        }
        for file in &written {
            self.observe_file(file).await?;
        }

        self.entry_count.store(self.index.len(), Ordering::SeqCst);
        self.compactions.fetch_add(1, Ordering::SeqCst);

        info!(
            store = %self.config.name,
            keys = loaded.durable.len(),
            written = written.len(),
            removed,
            "Compaction finished"
        );
        Ok(true)
    }
}
