//! Raw Store Module
//!
//! The minimal byte-store interface the transaction log is written against.
//!
//! ## Responsibilities
//! - Whole-value get/set and cheap append of byte blobs by key
//! - Key enumeration and per-key stat (size, last modified)
//! - Nothing else: no ordering, locking or atomicity beyond a single call
//!
//! Any backend that can provide these calls (a directory, a sandboxed
//! browser file system, an object store) can host a chunkstore.

mod file;
mod memory;

pub use file::FileRawStore;
pub use memory::InMemoryRawStore;

use async_trait::async_trait;

use crate::error::Result;

/// Stat information for one raw key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInfo {
    /// Size of the stored value in bytes
    pub size: u64,
    /// Last modification time (unix millis)
    pub last_modified: u64,
}

/// Byte store consumed by the transaction log
///
/// Implementations must be safe to share between several stores (and
/// several writer instances) at once. A missing key is `Ok(None)` for
/// `get`/`get_info` and a no-op for `remove`.
#[async_trait]
pub trait RawStore: Send + Sync {
    /// Read a whole value
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace a value, creating it if needed
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Append to a value, creating it if needed
    async fn append(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Delete a value
    async fn remove(&self, key: &str) -> Result<()>;

    /// List every key currently stored
    async fn get_keys(&self) -> Result<Vec<String>>;

    /// Stat a value
    async fn get_info(&self, key: &str) -> Result<Option<RawInfo>>;

    /// Delete every value
    async fn reset(&self) -> Result<()>;
}
