//! Resync Watcher
//!
//! Notices chunk files written by other writer instances sharing the raw
//! store, reloads, and tells subscribers when the visible data changed.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::engine::StoreInner;
use crate::error::Result;
use crate::index::values_differ;

impl StoreInner {
    /// Compare the raw listing against the registry; reload on any change.
    ///
    /// The comparison runs outside the sequencer, the reload inside it.
    pub(crate) async fn check_resync(self: &Arc<Self>) -> Result<bool> {
        let files = self.chunk_files().await?;
        let mut observed = Vec::with_capacity(files.len());
        for file in files {
            let info = self.raw.get_info(&file).await?;
            observed.push((file, info));
        }

        let changed = self.registry.lock().has_changes(&observed);
        if !changed {
            trace!(store = %self.config.name, "Chunk files unchanged");
            return Ok(false);
        }

        debug!(store = %self.config.name, files = observed.len(), "Chunk files changed, reloading");
        let inner = Arc::clone(self);
        self.sequencer
            .run(async move { inner.reload_and_notify().await })
            .await
    }

    /// Reload from disk and fire the resync callbacks if any value changed
    async fn reload_and_notify(&self) -> Result<bool> {
        let before = self.index.snapshot();
        self.load_all().await?;
        let changed = values_differ(&before, &self.index.snapshot());

        if changed {
            let callbacks = self.resync_callbacks.lock().clone();
            info!(
                store = %self.config.name,
                subscribers = callbacks.len(),
                "Resync picked up outside changes"
            );
            for callback in &callbacks {
                callback();
            }
        }
        Ok(changed)
    }
}

/// Start polling for outside changes, if an interval is configured.
///
/// The task holds only a weak reference and ends once the store is gone.
pub(crate) fn spawn_watcher(inner: &Arc<StoreInner>) -> Option<JoinHandle<()>> {
    let interval_ms = inner.config.resync_interval_ms;
    if interval_ms == 0 {
        return None;
    }

    let weak: Weak<StoreInner> = Arc::downgrade(inner);
    let period = Duration::from_millis(interval_ms);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            if let Err(e) = inner.check_resync().await {
                warn!(store = %inner.config.name, error = %e, "Resync failed");
            }
        }
    }))
}
