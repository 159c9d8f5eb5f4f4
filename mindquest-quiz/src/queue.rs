//! Background ingestion queue.
//!
//! Documents submitted to an [`IngestionQueue`] are processed by a bounded
//! pool of workers. Submission never blocks: a full queue is reported as
//! [`QuestError::QueueFull`] so callers can surface backpressure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{QuestError, Result};
use crate::pipeline::{DocumentPipeline, ProcessOutcome};

/// Counters of an [`IngestionQueue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Documents accepted by `submit`.
    pub submitted: u64,
    /// Runs that ended `completed` (including already-completed documents).
    pub completed: u64,
    /// Runs that ended `failed` or could not start.
    pub failed: u64,
}

impl QueueStats {
    /// Accepted documents whose run has not finished yet.
    pub fn in_flight(&self) -> u64 {
        self.submitted.saturating_sub(self.completed + self.failed)
    }
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Work queue feeding a [`DocumentPipeline`] with at most `workers`
/// documents in flight.
pub struct IngestionQueue {
    sender: Mutex<Option<mpsc::Sender<Uuid>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for IngestionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionQueue").field("stats", &self.stats()).finish()
    }
}

impl IngestionQueue {
    /// Spawn the dispatcher on the current tokio runtime.
    ///
    /// `workers` and `capacity` are clamped to at least 1.
    pub fn start(pipeline: DocumentPipeline, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let dispatcher = tokio::spawn(dispatch(receiver, pipeline, semaphore, counters.clone()));
        info!(workers = workers.max(1), capacity = capacity.max(1), "ingestion queue started");

        Self {
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            counters,
        }
    }

    /// Queue a document for processing.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::QueueFull`] if no slot is free, or
    /// [`QuestError::QueueClosed`] after [`shutdown`](Self::shutdown).
    pub fn submit(&self, document_id: Uuid) -> Result<()> {
        let guard = self.sender.lock().map_err(|_| QuestError::QueueClosed)?;
        let sender = guard.as_ref().ok_or(QuestError::QueueClosed)?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        sender.try_send(document_id).map_err(|e| {
            self.counters.submitted.fetch_sub(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    warn!(document.id = %document_id, "ingestion queue full");
                    QuestError::QueueFull
                }
                mpsc::error::TrySendError::Closed(_) => QuestError::QueueClosed,
            }
        })?;
        debug!(document.id = %document_id, "queued document");
        Ok(())
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting documents and wait until queued and in-flight
    /// documents are done.
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().ok().and_then(|mut s| s.take());
        drop(sender);

        let dispatcher = self.dispatcher.lock().ok().and_then(|mut d| d.take());
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                warn!(error = %e, "ingestion dispatcher ended abnormally");
            }
        }
        info!(stats = ?self.stats(), "ingestion queue stopped");
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<Uuid>,
    pipeline: DocumentPipeline,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
) {
    let mut running = JoinSet::new();

    while let Some(document_id) = receiver.recv().await {
        let Ok(permit) = semaphore.clone().acquire_owned().await else { break };
        let pipeline = pipeline.clone();
        let counters = counters.clone();

        running.spawn(async move {
            let _permit = permit;
            match pipeline.process(document_id).await {
                Ok(ProcessOutcome::Completed { .. } | ProcessOutcome::AlreadyCompleted) => {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(ProcessOutcome::Failed { .. }) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(document.id = %document_id, error = %e, "could not process queued document");
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        while running.try_join_next().is_some() {}
    }

    while running.join_next().await.is_some() {}
}
