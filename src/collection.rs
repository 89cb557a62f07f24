//! Collection Module
//!
//! Typed façade over a [`TransactionStore`]: values go in and out as JSON.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::config::Config;
use crate::engine::TransactionStore;
use crate::error::Result;
use crate::index::EntryInfo;
use crate::kv::KeyValueStore;
use crate::raw::RawStore;

/// A named collection of `T` values
pub struct Collection<T> {
    store: TransactionStore,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: TransactionStore) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Open a collection on its own sequencer
    ///
    /// Collections sharing a storage root in this process belong on one
    /// [`StorageRoot`](crate::StorageRoot) so their writes are ordered.
    pub async fn open(raw: Arc<dyn RawStore>, config: Config) -> Result<Self> {
        Ok(Self::new(TransactionStore::open(raw, config).await?))
    }

    /// Current value of a key
    ///
    /// A stored value that no longer parses as `T` reads as absent.
    pub fn get(&self, key: &str) -> Option<T> {
        let bytes = self.store.get(key)?;
        self.decode(key, &bytes)
    }

    pub fn set(&self, key: impl Into<String>, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.store.set(key, bytes);
        Ok(())
    }

    pub fn remove(&self, key: &str) {
        self.store.remove(key);
    }

    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }

    /// Every entry that parses as `T`, in key order
    pub fn entries(&self) -> Vec<(String, T)> {
        self.store
            .entries()
            .into_iter()
            .filter_map(|(key, bytes)| {
                let value = self.decode(&key, &bytes)?;
                Some((key, value))
            })
            .collect()
    }

    pub fn values(&self) -> Vec<T> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    pub fn info(&self, key: &str) -> Option<EntryInfo> {
        self.store.info(key)
    }

    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }

    pub async fn reset(&self) -> Result<()> {
        self.store.reset().await
    }

    pub fn pending_count(&self) -> usize {
        self.store.pending_count()
    }

    pub fn watch_resync<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.store.watch_resync(callback);
    }

    /// The underlying byte store
    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    fn decode(&self, key: &str, bytes: &[u8]) -> Option<T> {
        match serde_json::from_slice(bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(store = %self.store.name(), key, error = %e, "Stored value is not valid JSON for this collection");
                None
            }
        }
    }
}

impl<T> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection").field("store", &self.store).finish()
    }
}

#[async_trait]
impl<T> KeyValueStore for Collection<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Value = T;

    async fn get(&self, key: &str) -> Result<Option<T>> {
        Ok(Collection::get(self, key))
    }

    async fn set(&self, key: &str, value: T) -> Result<()> {
        Collection::set(self, key, &value)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        Collection::remove(self, key);
        Ok(())
    }

    async fn get_keys(&self) -> Result<Vec<String>> {
        Ok(self.keys())
    }

    async fn get_info(&self, key: &str) -> Result<Option<EntryInfo>> {
        Ok(self.info(key))
    }

    async fn reset(&self) -> Result<()> {
        Collection::reset(self).await
    }
}
