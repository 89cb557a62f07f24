//! # chunkstore
//!
//! An embeddable key/value store persisted as an append-only transaction log:
//! - Writes answer from memory at once and reach disk in debounced batches
//! - Chunk files survive torn writes and stray bytes (magic-anchored frames)
//! - Periodic compaction folds superseded entries away, verified before delete
//! - Several writer instances may share one raw store and resync from it
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Collection<T>  /  TransactionStore              │
//! │        (sync reads and writes against the MemIndex)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ pending batch (write delay)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  WriteSequencer (per root)                   │
//! │       flush │ compaction │ resync reload │ reset             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────┐
//!   │    TxLog    │          │ DiskRegistry │
//!   │  (frames,   │          │ (file stats) │
//!   │   chunks)   │          └──────────────┘
//!   └──────┬──────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │  RawStore   │
//!   │ (file/mem)  │
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod raw;
pub mod txlog;
pub mod index;
pub mod storage;
pub mod sequencer;
pub mod engine;
pub mod kv;
pub mod collection;
pub mod root;

mod resync;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{CompactionPolicy, Config, ConfigBuilder};
pub use raw::{FileRawStore, InMemoryRawStore, RawInfo, RawStore};
pub use index::EntryInfo;
pub use engine::{ResyncCallback, TransactionStore};
pub use kv::KeyValueStore;
pub use collection::Collection;
pub use root::StorageRoot;
pub use sequencer::WriteSequencer;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of chunkstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
