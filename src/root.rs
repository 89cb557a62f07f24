//! Storage Root
//!
//! Groups the collections that write to one raw store behind a single
//! write sequencer.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::collection::Collection;
use crate::config::Config;
use crate::engine::{StoreInner, TransactionStore};
use crate::error::Result;
use crate::raw::RawStore;
use crate::sequencer::WriteSequencer;

/// Shared sequencer plus the stores opened on it
///
/// Cloning is cheap; clones refer to the same root.
#[derive(Clone, Default)]
pub struct StorageRoot {
    sequencer: WriteSequencer,
    stores: Arc<Mutex<Vec<Weak<StoreInner>>>>,
}

impl StorageRoot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a byte store whose disk work is ordered with every other store
    /// on this root
    pub async fn open_store(&self, raw: Arc<dyn RawStore>, config: Config) -> Result<TransactionStore> {
        let store = TransactionStore::open_with(raw, config, self.sequencer.clone()).await?;

        let mut stores = self.stores.lock();
        stores.retain(|weak| weak.strong_count() > 0);
        stores.push(Arc::downgrade(&store.inner));
        Ok(store)
    }

    /// Open a typed collection on this root
    pub async fn open_collection<T>(&self, raw: Arc<dyn RawStore>, config: Config) -> Result<Collection<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        Ok(Collection::new(self.open_store(raw, config).await?))
    }

    /// Force a compaction of every open store, in one sequencer job.
    ///
    /// Returns how many stores were compacted.
    pub async fn compact_all(&self) -> Result<usize> {
        let live: Vec<Arc<StoreInner>> = self
            .stores
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        let compacted = self
            .sequencer
            .run(async move {
                let mut compacted = 0;
                for inner in &live {
                    if inner.maybe_compact(true).await? {
                        compacted += 1;
                    }
                }
                Ok(compacted)
            })
            .await?;

        info!(compacted, "Compacted all stores");
        Ok(compacted)
    }

    /// Stores opened on this root that are still alive
    pub fn store_count(&self) -> usize {
        self.stores
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn sequencer(&self) -> &WriteSequencer {
        &self.sequencer
    }
}

impl std::fmt::Debug for StorageRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageRoot")
            .field("stores", &self.store_count())
            .finish()
    }
}
