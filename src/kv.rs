//! Async key/value interface shared by byte stores and typed collections.

use async_trait::async_trait;

use crate::error::Result;
use crate::index::EntryInfo;

/// Promise-style access to a store
///
/// Every call resolves against the in-memory index, so reads never wait
/// on disk. `reset` is the only call that does I/O before returning.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    type Value: Send;

    async fn get(&self, key: &str) -> Result<Option<Self::Value>>;

    async fn set(&self, key: &str, value: Self::Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn get_keys(&self) -> Result<Vec<String>>;

    async fn get_info(&self, key: &str) -> Result<Option<EntryInfo>>;

    async fn reset(&self) -> Result<()>;
}
