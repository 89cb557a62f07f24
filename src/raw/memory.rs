//! In-memory raw store
//!
//! A `RawStore` backed by a map, suitable for tests and for simulating
//! several writer instances that share one physical store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::Result;

use super::{RawInfo, RawStore};

#[derive(Debug, Clone)]
struct Blob {
    data: Vec<u8>,
    last_modified: u64,
}

#[derive(Debug, Default)]
struct State {
    blobs: BTreeMap<String, Blob>,
    /// Last handed-out modification stamp, kept strictly increasing so
    /// two writes in the same millisecond are still distinguishable
    clock: u64,
}

impl State {
    fn tick(&mut self) -> u64 {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.clock = now.max(self.clock + 1);
        self.clock
    }
}

/// In-memory implementation of RawStore
#[derive(Debug, Default)]
pub struct InMemoryRawStore {
    state: Mutex<State>,
}

impl InMemoryRawStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.state.lock().blobs.len()
    }

    /// Check whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.state.lock().blobs.is_empty()
    }

    /// Overwrite bytes in place without touching the modification stamp.
    ///
    /// Models media corruption; returns false if the key is missing or the
    /// range is out of bounds.
    pub fn corrupt(&self, key: &str, offset: usize, bytes: &[u8]) -> bool {
        let mut state = self.state.lock();
        let Some(blob) = state.blobs.get_mut(key) else {
            return false;
        };
        let Some(target) = blob.data.get_mut(offset..offset + bytes.len()) else {
            return false;
        };
        target.copy_from_slice(bytes);
        true
    }
}

#[async_trait]
impl RawStore for InMemoryRawStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.state.lock().blobs.get(key).map(|blob| blob.data.clone()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let last_modified = state.tick();
        state.blobs.insert(
            key.to_string(),
            Blob {
                data: value.to_vec(),
                last_modified,
            },
        );
        trace!(key, len = value.len(), "set");
        Ok(())
    }

    async fn append(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let last_modified = state.tick();
        let blob = state.blobs.entry(key.to_string()).or_insert_with(|| Blob {
            data: Vec::new(),
            last_modified,
        });
        blob.data.extend_from_slice(value);
        blob.last_modified = last_modified;
        trace!(key, len = value.len(), "append");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.state.lock().blobs.remove(key);
        Ok(())
    }

    async fn get_keys(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().blobs.keys().cloned().collect())
    }

    async fn get_info(&self, key: &str) -> Result<Option<RawInfo>> {
        Ok(self.state.lock().blobs.get(key).map(|blob| RawInfo {
            size: blob.data.len() as u64,
            last_modified: blob.last_modified,
        }))
    }

    async fn reset(&self) -> Result<()> {
        self.state.lock().blobs.clear();
        Ok(())
    }
}
