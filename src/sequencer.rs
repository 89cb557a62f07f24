//! Write Sequencer
//!
//! Serial job queue that orders every raw-store write of a storage root.
//!
//! Flushes, compactions, resync reloads and resets from all collections on
//! one root are submitted here and run one at a time, in submission order,
//! on a single worker task. Their bytes therefore never interleave, even
//! when many collections share the root.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::error::{Result, StoreError};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Handle to the serial worker of a storage root
///
/// Cloning is cheap; clones submit to the same queue. The worker task is
/// spawned on first use on the caller's runtime and restarted if that
/// runtime has gone away.
#[derive(Clone, Default)]
pub struct WriteSequencer {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<Job>>>>,
}

impl std::fmt::Debug for WriteSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSequencer").finish_non_exhaustive()
    }
}

impl WriteSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` after every previously submitted job has finished.
    ///
    /// A job must not submit to the same sequencer and await the result;
    /// it would wait on itself.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            // Caller may have stopped waiting; the job still ran to completion.
            let _ = reply_tx.send(job.await);
        });

        self.worker()
            .send(job)
            .map_err(|_| StoreError::SequencerClosed)?;
        reply_rx.await.map_err(|_| StoreError::SequencerClosed)?
    }

    fn worker(&self) -> mpsc::UnboundedSender<Job> {
        let mut sender = self.sender.lock();
        if let Some(tx) = sender.as_ref().filter(|tx| !tx.is_closed()) {
            return tx.clone();
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
            trace!("Write sequencer stopped");
        });
        *sender = Some(tx.clone());
        tx
    }
}
