//! Configuration for chunkstore
//!
//! Centralized configuration with sensible defaults.

use crate::error::{Result, StoreError};

/// Main configuration for a transaction store
#[derive(Debug, Clone)]
pub struct Config {
    /// Name used in log lines (usually the collection name)
    pub name: String,

    // -------------------------------------------------------------------------
    // Write Batching
    // -------------------------------------------------------------------------
    /// Debounce delay between the first queued write and its flush (milliseconds)
    pub write_delay_ms: u64,

    // -------------------------------------------------------------------------
    // Chunk Files
    // -------------------------------------------------------------------------
    /// A chunk file stops accepting appends once it reaches this many bytes
    pub chunk_size: usize,

    /// A chunk file stops accepting appends once it is this old (milliseconds)
    pub chunk_max_age_ms: u64,

    /// Compacted chunks at least this large are gzip-compressed as a whole
    pub file_zip_threshold: usize,

    /// Values at least this large are gzip-compressed individually.
    /// `None` disables per-value compression.
    pub value_zip_threshold: Option<usize>,

    // -------------------------------------------------------------------------
    // Compaction / Resync
    // -------------------------------------------------------------------------
    /// When to fold the log into fresh chunk files
    pub compaction: CompactionPolicy,

    /// How often to poll the raw store for foreign writes (milliseconds, 0 = never)
    pub resync_interval_ms: u64,
}

/// Thresholds deciding when a compaction is due
///
/// Compaction runs when the log carries mostly superseded entries
/// (`entries > min_entries && entries > garbage_ratio * live_keys`) or when
/// there are more chunk files than the log size justifies
/// (`files > max(min_file_budget, ceil(entries / entries_per_file))` or
/// `files > max_files`).
#[derive(Debug, Clone, Copy)]
pub struct CompactionPolicy {
    pub min_entries: usize,
    pub garbage_ratio: usize,
    pub entries_per_file: usize,
    pub min_file_budget: usize,
    pub max_files: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            min_entries: 100,
            garbage_ratio: 3,
            entries_per_file: 1000,
            min_file_budget: 10,
            max_files: 10_000,
        }
    }
}

impl CompactionPolicy {
    /// Decide whether a compaction is due for the given log shape
    pub fn is_due(&self, entry_count: usize, live_keys: usize, chunk_files: usize) -> bool {
        let mostly_garbage = entry_count > self.min_entries
            && entry_count > live_keys.saturating_mul(self.garbage_ratio);
        let file_budget = self
            .min_file_budget
            .max(entry_count.div_ceil(self.entries_per_file));

        mostly_garbage || chunk_files > file_budget || chunk_files > self.max_files
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            write_delay_ms: 500,
            chunk_size: 1024 * 1024,                 // 1 MB
            chunk_max_age_ms: 30 * 60 * 1000,        // 30 minutes
            file_zip_threshold: 16 * 1024 * 1024,    // 16 MB
            value_zip_threshold: None,
            compaction: CompactionPolicy::default(),
            resync_interval_ms: 5 * 60 * 1000,       // 5 minutes
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the store cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(StoreError::Config("chunk_size must be non-zero".to_string()));
        }
        if self.compaction.entries_per_file == 0 {
            return Err(StoreError::Config(
                "compaction.entries_per_file must be non-zero".to_string(),
            ));
        }
        if self.compaction.garbage_ratio == 0 {
            return Err(StoreError::Config(
                "compaction.garbage_ratio must be non-zero".to_string(),
            ));
        }
        if self.value_zip_threshold == Some(0) {
            return Err(StoreError::Config(
                "value_zip_threshold must be non-zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the store name used in logs
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the write debounce delay (in milliseconds)
    pub fn write_delay_ms(mut self, ms: u64) -> Self {
        self.config.write_delay_ms = ms;
        self
    }

    /// Set the chunk size threshold (in bytes)
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the maximum age of an open chunk file (in milliseconds)
    pub fn chunk_max_age_ms(mut self, ms: u64) -> Self {
        self.config.chunk_max_age_ms = ms;
        self
    }

    /// Set the size above which compacted chunks are gzipped
    pub fn file_zip_threshold(mut self, size: usize) -> Self {
        self.config.file_zip_threshold = size;
        self
    }

    /// Enable per-value compression for values of at least `size` bytes
    pub fn value_zip_threshold(mut self, size: usize) -> Self {
        self.config.value_zip_threshold = Some(size);
        self
    }

    /// Set the compaction policy
    pub fn compaction(mut self, policy: CompactionPolicy) -> Self {
        self.config.compaction = policy;
        self
    }

    /// Set the resync poll interval (in milliseconds, 0 disables polling)
    pub fn resync_interval_ms(mut self, ms: u64) -> Self {
        self.config.resync_interval_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
