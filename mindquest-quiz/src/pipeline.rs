//! Document processing state machine.
//!
//! ```text
//! pending ──▶ processing ──▶ completed
//!    │            │
//!    └────────────┴──────▶ failed ──▶ processing (re-run)
//! ```
//!
//! The `processing` transition is a single conditional store write made
//! before any external call: concurrent runners cannot both claim a
//! document, and a crash mid-run leaves it visibly stuck in `processing`. Stage
//! failures are recorded as `failed` and never propagate to the caller.

use std::sync::Arc;

use chrono::Utc;
use mindquest_rag::IngestPipeline;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{QuestError, Result};
use crate::locator::ObjectLocator;
use crate::model::{Document, DocumentStatus};
use crate::store::QuestStore;

/// How one processing run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Every stage succeeded.
    Completed { chunk_count: usize },
    /// A stage failed; the document is now `failed`.
    Failed { reason: String },
    /// The document was already `completed`; nothing ran.
    AlreadyCompleted,
}

impl ProcessOutcome {
    pub fn status(&self) -> DocumentStatus {
        match self {
            Self::Completed { .. } | Self::AlreadyCompleted => DocumentStatus::Completed,
            Self::Failed { .. } => DocumentStatus::Failed,
        }
    }
}

/// Drives a document through fetch → extract → chunk → embed → index while
/// keeping its status in the store.
#[derive(Clone)]
pub struct DocumentPipeline {
    store: Arc<dyn QuestStore>,
    locator: Arc<dyn ObjectLocator>,
    ingest: IngestPipeline,
}

impl DocumentPipeline {
    pub fn new(store: Arc<dyn QuestStore>, locator: Arc<dyn ObjectLocator>, ingest: IngestPipeline) -> Self {
        Self { store, locator, ingest }
    }

    /// The ingestion pipeline (and through it, the embedder and index).
    pub fn ingest(&self) -> &IngestPipeline {
        &self.ingest
    }

    /// Process one document.
    ///
    /// Runs from `pending` or `failed`. A `completed` document is left alone.
    ///
    /// # Errors
    ///
    /// Only bookkeeping errors are returned:
    /// - [`QuestError::NotFound`] if the document does not exist
    /// - [`QuestError::Validation`] if the document is already `processing`
    /// - [`QuestError::Storage`] if a status update cannot be written
    pub async fn process(&self, document_id: Uuid) -> Result<ProcessOutcome> {
        let (mut document, claimed) = self.store.begin_processing(document_id).await?;
        if !claimed {
            return match document.status {
                DocumentStatus::Completed => Ok(ProcessOutcome::AlreadyCompleted),
                _ => Err(QuestError::Validation(format!("document {document_id} is already processing"))),
            };
        }

        info!(document.id = %document.id, topic.id = %document.topic_id, "processing document");

        match self.run_stages(&document).await {
            Ok(chunk_count) => {
                document.status = DocumentStatus::Completed;
                document.processed_at = Some(Utc::now());
                self.store.update_document(&document).await?;
                info!(document.id = %document.id, chunk_count, "document completed");
                Ok(ProcessOutcome::Completed { chunk_count })
            }
            Err(e) => {
                error!(document.id = %document.id, error = %e, "document processing failed");
                document.status = DocumentStatus::Failed;
                self.store.update_document(&document).await?;
                Ok(ProcessOutcome::Failed { reason: e.to_string() })
            }
        }
    }

    /// Process every `pending` or `failed` document of a topic, one after
    /// another. Returns how many documents completed.
    ///
    /// Documents already `processing` are skipped. Per-document failures are
    /// logged and do not stop the others.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::Storage`] if the document list cannot be read.
    pub async fn process_outstanding(&self, topic_id: Uuid) -> Result<usize> {
        let outstanding: Vec<Document> = self
            .store
            .documents_for_topic(topic_id)
            .await?
            .into_iter()
            .filter(|d| d.status.can_start())
            .collect();

        let mut completed = 0;
        for document in outstanding {
            match self.process(document.id).await {
                Ok(ProcessOutcome::Completed { .. } | ProcessOutcome::AlreadyCompleted) => completed += 1,
                Ok(ProcessOutcome::Failed { reason }) => {
                    warn!(document.id = %document.id, %reason, "skipping failed document");
                }
                Err(e) => warn!(document.id = %document.id, error = %e, "could not process document"),
            }
        }
        Ok(completed)
    }

    async fn run_stages(&self, document: &Document) -> Result<usize> {
        let bytes = self.locator.fetch(&document.locator).await?;
        let report = self
            .ingest
            .ingest(&document.topic_id.to_string(), &document.id.to_string(), &bytes)
            .await?;
        Ok(report.chunk_count)
    }
}
