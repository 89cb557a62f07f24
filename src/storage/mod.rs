//! Storage Module
//!
//! Chunk file bookkeeping and compaction of the transaction log.
//!
//! ## Responsibilities
//! - Track the stat of every chunk file we have read or written
//! - Decide when the log has grown too wasteful
//! - Fold the log into fresh chunk files holding only live entries
//!
//! ## Compaction Steps
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐   ┌────────────┐
//! │  Reload  │──►│ Write chunks │──►│  Verify  │──►│ Delete old │
//! │ all logs │   │ (live only)  │   │ readback │   │   chunks   │
//! └──────────┘   └──────────────┘   └──────────┘   └────────────┘
//! ```
//! A failed verification aborts before anything is deleted.

mod compaction;
mod registry;

pub use registry::DiskRegistry;
