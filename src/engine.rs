//! Engine Module
//!
//! The transaction store that coordinates index, batcher and chunk files.
//!
//! ## Responsibilities
//! - Serve reads from the in-memory index
//! - Queue writes and flush them as one batch after the write delay
//! - Replay every chunk file on open, resync and compaction
//! - Route all raw-store writes through the root's sequencer
//!
//! ## Lifecycle
//! ```text
//!   open ──► Loading ──► Ready ◄──────────────┐
//!                          │                  │
//!                 set/remove (sync, index)    │
//!                          │                  │
//!                          ▼                  │
//!                   Pending batch ── delay ──►│ flush (sequencer)
//!                                             │   └─► maybe compact
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::error::Result;
use crate::index::{EntryInfo, IndexEntry, MemIndex};
use crate::kv::KeyValueStore;
use crate::raw::RawStore;
use crate::sequencer::WriteSequencer;
use crate::storage::DiskRegistry;
use crate::txlog::{
    encode_entry, gzip, is_chunk_file, next_flush_stamp, now_millis, pack_frames, ChunkHeader,
    ChunkWriter, EntryValue, RecoveryStats, Replay, TransactionEntry,
};

/// Callback fired after a resync changed the visible data
pub type ResyncCallback = Arc<dyn Fn() + Send + Sync>;

/// Replays slower than this are logged at info level
const SLOW_LOAD: Duration = Duration::from_millis(50);

// =============================================================================
// Transaction Store
// =============================================================================

/// A named key/value collection persisted as an append-only transaction log
///
/// ## Concurrency Model
///
/// - **Reads** (get/keys/entries/info): served from the index, never block
///   on I/O
/// - **Writes** (set/remove): update the index and the pending batch
///   synchronously; the batch lock is taken before the index lock
/// - **Disk work** (flush/compact/resync/reset): one job at a time on the
///   root's [`WriteSequencer`]
pub struct TransactionStore {
    pub(crate) inner: Arc<StoreInner>,
    watcher: Option<JoinHandle<()>>,
}

/// Writes queued since the last flush
#[derive(Debug, Default)]
pub(crate) struct Batch {
    pub(crate) pending: Vec<TransactionEntry>,
    pub(crate) flush_scheduled: bool,
    /// Entries taken by a flush that has not finished yet
    pub(crate) in_flight: usize,
}

/// State shared by the store handle, its flush tasks and its watcher
pub(crate) struct StoreInner {
    pub(crate) config: Config,
    pub(crate) raw: Arc<dyn RawStore>,
    pub(crate) sequencer: WriteSequencer,
    pub(crate) index: MemIndex,
    pub(crate) batch: Mutex<Batch>,
    pub(crate) writer: Mutex<ChunkWriter>,
    pub(crate) registry: Mutex<DiskRegistry>,
    /// Entries in the log, superseded ones included
    pub(crate) entry_count: AtomicUsize,
    pub(crate) compacting: AtomicBool,
    pub(crate) compactions: AtomicU64,
    pub(crate) resync_callbacks: Mutex<Vec<ResyncCallback>>,
    runtime: Handle,
}

/// Result of replaying every chunk file
#[derive(Debug)]
pub(crate) struct LoadOutcome {
    /// Chunk files that were read
    pub(crate) files: Vec<String>,
    /// Live entries found on disk, pending writes not applied
    pub(crate) durable: BTreeMap<String, IndexEntry>,
    pub(crate) stats: RecoveryStats,
}

impl TransactionStore {
    /// Open a store on its own sequencer
    ///
    /// Writes are only ordered against stores on the same sequencer. Every
    /// store of one physical storage root in this process must be opened
    /// through a single shared [`StorageRoot`](crate::StorageRoot); stores
    /// opened here each form their own ordering domain.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(raw: Arc<dyn RawStore>, config: Config) -> Result<Self> {
        Self::open_with(raw, config, WriteSequencer::new()).await
    }

    pub(crate) async fn open_with(
        raw: Arc<dyn RawStore>,
        config: Config,
        sequencer: WriteSequencer,
    ) -> Result<Self> {
        config.validate()?;

        let writer = ChunkWriter::new(config.chunk_size, config.chunk_max_age_ms);
        let inner = Arc::new(StoreInner {
            config,
            raw,
            sequencer,
            index: MemIndex::new(),
            batch: Mutex::new(Batch::default()),
            writer: Mutex::new(writer),
            registry: Mutex::new(DiskRegistry::new()),
            entry_count: AtomicUsize::new(0),
            compacting: AtomicBool::new(false),
            compactions: AtomicU64::new(0),
            resync_callbacks: Mutex::new(Vec::new()),
            runtime: Handle::current(),
        });

        let outcome = inner.load_all().await?;
        info!(
            store = %inner.config.name,
            files = outcome.files.len(),
            entries = outcome.stats.entries_recovered,
            keys = inner.index.len(),
            "Opened transaction store"
        );

        let watcher = crate::resync::spawn_watcher(&inner);
        Ok(Self { inner, watcher })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current value of a key
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.inner.index.get(key)
    }

    /// All live keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        self.inner.index.keys()
    }

    /// All live key/value pairs in sorted key order
    pub fn entries(&self) -> Vec<(String, Bytes)> {
        self.inner.index.entries()
    }

    /// All live values in key order
    pub fn values(&self) -> Vec<Bytes> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// Size and last write time of a key
    pub fn info(&self, key: &str) -> Option<EntryInfo> {
        self.inner.index.info(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.index.get(key).is_some()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set a key; visible to reads immediately, on disk after the next flush
    pub fn set(&self, key: impl Into<String>, value: impl Into<Bytes>) {
        self.inner
            .enqueue(TransactionEntry::put(key, value, now_millis()));
    }

    /// Remove a key; removing an absent key still writes a tombstone
    pub fn remove(&self, key: &str) {
        self.inner.enqueue(TransactionEntry::tombstone(key, now_millis()));
    }

    /// Write the pending batch now instead of waiting for the write delay
    pub async fn flush(&self) -> Result<()> {
        self.inner.flush_now().await
    }

    /// Compact regardless of the policy
    ///
    /// Returns false if another compaction of this store was running.
    pub async fn compact(&self) -> Result<bool> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .sequencer
            .run(async move { inner.maybe_compact(true).await })
            .await
    }

    /// Check the chunk files for outside changes and reload if needed
    ///
    /// Returns true if the reload changed the visible data.
    pub async fn resync(&self) -> Result<bool> {
        self.inner.check_resync().await
    }

    /// Delete every chunk file and forget all entries, pending ones included
    pub async fn reset(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .sequencer
            .run(async move { inner.reset_all().await })
            .await
    }

    /// Flush and close the store
    pub async fn close(self) -> Result<()> {
        self.flush().await
    }

    /// Register a callback fired whenever a resync changes the data
    pub fn watch_resync<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.resync_callbacks.lock().push(Arc::new(callback));
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Writes not yet on disk, including a flush in progress
    pub fn pending_count(&self) -> usize {
        let batch = self.inner.batch.lock();
        batch.pending.len() + batch.in_flight
    }

    /// Entries in the log, superseded ones included
    pub fn entry_count(&self) -> usize {
        self.inner.entry_count.load(Ordering::SeqCst)
    }

    /// Live keys
    pub fn key_count(&self) -> usize {
        self.inner.index.len()
    }

    /// Compactions completed since open
    pub fn compaction_count(&self) -> u64 {
        self.inner.compactions.load(Ordering::SeqCst)
    }

    /// Chunk files currently in the raw store, sorted
    pub async fn chunk_files(&self) -> Result<Vec<String>> {
        self.inner.chunk_files().await
    }
}

impl Drop for TransactionStore {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl std::fmt::Debug for TransactionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionStore")
            .field("name", &self.inner.config.name)
            .field("keys", &self.inner.index.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyValueStore for TransactionStore {
    type Value = Bytes;

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(TransactionStore::get(self, key))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        TransactionStore::set(self, key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        TransactionStore::remove(self, key);
        Ok(())
    }

    async fn get_keys(&self) -> Result<Vec<String>> {
        Ok(self.keys())
    }

    async fn get_info(&self, key: &str) -> Result<Option<EntryInfo>> {
        Ok(self.info(key))
    }

    async fn reset(&self) -> Result<()> {
        TransactionStore::reset(self).await
    }
}

// =============================================================================
// Shared State
// =============================================================================

impl StoreInner {
    /// Apply a write to the index and queue it for the next flush
    fn enqueue(self: &Arc<Self>, entry: TransactionEntry) {
        let schedule = {
            let mut batch = self.batch.lock();
            match &entry.value {
                EntryValue::Value(value) => self.index.insert(
                    entry.key.clone(),
                    IndexEntry::new(value.clone(), entry.time),
                ),
                EntryValue::Tombstone => {
                    self.index.remove(&entry.key);
                }
            }
            batch.pending.push(entry);
            !std::mem::replace(&mut batch.flush_scheduled, true)
        };
        self.entry_count.fetch_add(1, Ordering::SeqCst);

        if schedule {
            self.schedule_flush();
        }
    }

    fn schedule_flush(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let delay = Duration::from_millis(self.config.write_delay_ms);
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = inner.flush_now().await {
                error!(store = %inner.config.name, error = %e, "Background flush failed");
            }
        });
    }

    pub(crate) async fn flush_now(self: &Arc<Self>) -> Result<()> {
        let inner = Arc::clone(self);
        self.sequencer
            .run(async move { inner.flush_batch().await })
            .await
    }

    /// Write the pending batch, then compact if the policy says so.
    ///
    /// Runs on the sequencer. A failed write is not retried; the entries
    /// stay visible in memory until the next reload.
    async fn flush_batch(&self) -> Result<()> {
        let entries = {
            let mut batch = self.batch.lock();
            batch.flush_scheduled = false;
            let entries = dedupe(std::mem::take(&mut batch.pending));
            batch.in_flight += entries.len();
            entries
        };
        if entries.is_empty() {
            return Ok(());
        }

        let count = entries.len();
        let result = match self.append_entries(entries).await {
            Ok(()) => self.maybe_compact(false).await.map(|_| ()),
            Err(e) => Err(e),
        };
        self.batch.lock().in_flight -= count;

        if let Err(e) = &result {
            error!(store = %self.config.name, entries = count, error = %e, "Failed to flush batch");
        }
        result
    }

    /// Stamp, encode and append entries to the open chunk
    async fn append_entries(&self, entries: Vec<TransactionEntry>) -> Result<()> {
        let time = next_flush_stamp();
        let count = entries.len();

        let mut frames = Vec::with_capacity(count);
        let mut written = Vec::new();
        for mut entry in entries {
            if let EntryValue::Value(value) = &entry.value {
                written.push((entry.key.clone(), entry.time, value.clone()));
            }
            entry.time = time;
            let entry = self.compress_value(entry)?;
            frames.push(encode_entry(&entry)?);
        }

        for chunk in pack_frames(frames, self.config.chunk_size) {
            let mut target = self.writer.lock().target(now_millis(), chunk.len());
            if !target.needs_header && self.raw.get_info(&target.name).await?.is_none() {
                // Deleted by a compaction elsewhere; appending would recreate it headerless
                warn!(
                    store = %self.config.name,
                    file = %target.name,
                    "Open chunk vanished, starting a new one"
                );
                self.registry.lock().forget(&target.name);
                let mut writer = self.writer.lock();
                writer.close();
                target = writer.target(now_millis(), chunk.len());
            }
            if target.needs_header {
                let header = ChunkHeader { zipped: false }.encode()?;
                self.raw.set(&target.name, &header).await?;
                self.writer.lock().header_written();
            }
            self.raw.append(&target.name, &chunk).await?;
            self.writer.lock().record_append(chunk.len());
            self.observe_file(&target.name).await?;
        }

        for (key, queued_at, value) in written {
            self.index.restamp(&key, queued_at, &value, time);
        }

        debug!(store = %self.config.name, entries = count, time, "Flushed batch");
        Ok(())
    }

    /// Gzip a value at or above the configured threshold
    pub(crate) fn compress_value(&self, mut entry: TransactionEntry) -> Result<TransactionEntry> {
        let Some(threshold) = self.config.value_zip_threshold else {
            return Ok(entry);
        };
        if let EntryValue::Value(value) = &entry.value {
            if value.len() >= threshold {
                entry.value = EntryValue::Value(Bytes::from(gzip(value)?));
                entry.compressed = true;
            }
        }
        Ok(entry)
    }

    /// Remember the current stat of a file we wrote
    pub(crate) async fn observe_file(&self, file: &str) -> Result<()> {
        if let Some(info) = self.raw.get_info(file).await? {
            self.registry.lock().observe(file, info);
        }
        Ok(())
    }

    pub(crate) async fn chunk_files(&self) -> Result<Vec<String>> {
        let mut files: Vec<String> = self
            .raw
            .get_keys()
            .await?
            .into_iter()
            .filter(|key| is_chunk_file(key))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Replay every chunk file and swap the result into the index.
    ///
    /// Pending writes are laid over the replayed state so they stay
    /// visible until their flush lands.
    #[instrument(skip(self), fields(store = %self.config.name))]
    pub(crate) async fn load_all(&self) -> Result<LoadOutcome> {
        let started = Instant::now();
        let files = self.chunk_files().await?;

        let mut replay = Replay::new();
        let mut registry = DiskRegistry::new();
        for file in &files {
            let info = self.raw.get_info(file).await?;
            let Some(bytes) = self.raw.get(file).await? else {
                warn!(file = %file, "Chunk file vanished during load");
                continue;
            };
            if let Some(info) = info {
                registry.observe(file, info);
            }
            replay.add_chunk(&self.config.name, file, &bytes);
        }
        let (durable, stats) = replay.finish();

        {
            let batch = self.batch.lock();
            let mut live = durable.clone();
            for entry in &batch.pending {
                match &entry.value {
                    EntryValue::Value(value) => {
                        live.insert(entry.key.clone(), IndexEntry::new(value.clone(), entry.time));
                    }
                    EntryValue::Tombstone => {
                        live.remove(&entry.key);
                    }
                }
            }
            self.index.replace(live);
            self.entry_count
                .store(stats.entries_recovered + batch.pending.len(), Ordering::SeqCst);
        }
        *self.registry.lock() = registry;

        // Another writer compacted our open chunk away; appending would
        // recreate it without a header
        {
            let mut writer = self.writer.lock();
            let vanished = writer
                .current_name()
                .is_some_and(|name| !files.iter().any(|file| file == name));
            if vanished {
                writer.close();
            }
        }

        let elapsed = started.elapsed();
        if stats.entries_corrupted > 0 || stats.unreadable_files > 0 {
            warn!(
                corrupted = stats.entries_corrupted,
                unreadable_files = stats.unreadable_files,
                skipped_bytes = stats.skipped_bytes,
                "Recovered transaction log with damaged chunks"
            );
        }
        if elapsed > SLOW_LOAD {
            info!(files = files.len(), entries = stats.entries_recovered, ?elapsed, "Loaded chunk files");
        } else {
            debug!(files = files.len(), entries = stats.entries_recovered, ?elapsed, "Loaded chunk files");
        }

        Ok(LoadOutcome {
            files,
            durable,
            stats,
        })
    }

    async fn reset_all(&self) -> Result<()> {
        let files = self.chunk_files().await?;
        for file in &files {
            if let Err(e) = self.raw.remove(file).await {
                warn!(store = %self.config.name, file = %file, error = %e, "Failed to remove chunk file");
            }
        }

        {
            let mut batch = self.batch.lock();
            batch.pending.clear();
            self.index.clear();
        }
        self.writer.lock().close();
        self.registry.lock().clear();
        self.entry_count.store(0, Ordering::SeqCst);

        info!(store = %self.config.name, files = files.len(), "Reset transaction store");
        Ok(())
    }
}

/// Keep only the last write of each key
fn dedupe(entries: Vec<TransactionEntry>) -> Vec<TransactionEntry> {
    let mut latest = BTreeMap::new();
    for entry in entries {
        latest.insert(entry.key.clone(), entry);
    }
    latest.into_values().collect()
}
