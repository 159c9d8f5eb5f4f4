//! Document registration and removal.

use std::sync::Arc;

use mindquest_rag::VectorIndex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{QuestError, Result};
use crate::locator::{ObjectLocator, document_key};
use crate::model::{Document, DocumentStatus};
use crate::queue::IngestionQueue;
use crate::store::QuestStore;

const ACCEPTED_EXTENSIONS: [&str; 2] = ["pdf", "txt"];

/// Registers uploaded documents and tears down their indexed content.
#[derive(Clone)]
pub struct DocumentService {
    store: Arc<dyn QuestStore>,
    locator: Arc<dyn ObjectLocator>,
    index: VectorIndex,
    queue: Option<Arc<IngestionQueue>>,
}

impl DocumentService {
    pub fn new(store: Arc<dyn QuestStore>, locator: Arc<dyn ObjectLocator>, index: VectorIndex) -> Self {
        Self { store, locator, index, queue: None }
    }

    /// Attach the queue used by [`upload_and_enqueue`](Self::upload_and_enqueue).
    pub fn with_queue(mut self, queue: Arc<IngestionQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Store `bytes` and register a `pending` document for `topic_id`.
    ///
    /// # Errors
    ///
    /// - [`QuestError::NotFound`] if the topic does not exist
    /// - [`QuestError::Validation`] for an empty upload or a file name that is
    ///   not a plain `.pdf` or `.txt` name
    /// - [`QuestError::Locator`] if the bytes cannot be stored
    pub async fn upload(&self, topic_id: Uuid, filename: &str, bytes: &[u8]) -> Result<Document> {
        validate_filename(filename)?;
        if bytes.is_empty() {
            return Err(QuestError::Validation(format!("'{filename}' is empty")));
        }
        if self.store.topic(topic_id).await?.is_none() {
            return Err(QuestError::not_found("topic", topic_id));
        }

        let mut document = Document::new(topic_id, filename, String::new());
        let key = document_key(&topic_id.to_string(), &document.id.to_string(), filename);
        document.locator = self.locator.put(&key, bytes).await?;
        self.store.insert_document(document.clone()).await?;

        info!(document.id = %document.id, topic.id = %topic_id, filename, size = bytes.len(), "registered document");
        Ok(document)
    }

    /// [`upload`](Self::upload), then queue the document for background processing.
    ///
    /// The document stays registered as `pending` if the queue rejects it.
    ///
    /// # Errors
    ///
    /// As [`upload`](Self::upload), plus [`QuestError::QueueFull`] or
    /// [`QuestError::QueueClosed`], and [`QuestError::Config`] if no queue is attached.
    pub async fn upload_and_enqueue(&self, topic_id: Uuid, filename: &str, bytes: &[u8]) -> Result<Document> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| QuestError::Config("no ingestion queue attached".to_string()))?;
        let document = self.upload(topic_id, filename, bytes).await?;
        queue.submit(document.id)?;
        Ok(document)
    }

    /// Every document of a topic with its current status, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::Storage`] if the store fails.
    pub async fn documents(&self, topic_id: Uuid) -> Result<Vec<Document>> {
        self.store.documents_for_topic(topic_id).await
    }

    /// Remove a document, its vector records and its stored bytes.
    ///
    /// Index and object cleanup failures are logged; the row is removed anyway.
    /// A document that is being processed cannot be deleted, since the
    /// running ingest would write its vectors back afterwards.
    ///
    /// # Errors
    ///
    /// - [`QuestError::NotFound`] if the document does not exist
    /// - [`QuestError::Validation`] if the document is `processing`
    pub async fn delete_document(&self, document_id: Uuid) -> Result<()> {
        let document = self
            .store
            .document(document_id)
            .await?
            .ok_or_else(|| QuestError::not_found("document", document_id))?;
        if document.status == DocumentStatus::Processing {
            return Err(QuestError::Validation(format!("document {document_id} is still processing")));
        }

        if let Err(e) =
            self.index.delete_document(&document.topic_id.to_string(), &document.id.to_string()).await
        {
            warn!(document.id = %document.id, error = %e, "failed to delete vector records");
        }
        if let Err(e) = self.locator.remove(&document.locator).await {
            warn!(document.id = %document.id, error = %e, "failed to remove stored bytes");
        }

        self.store.delete_document(document_id).await?;
        info!(document.id = %document_id, "deleted document");
        Ok(())
    }

    /// Drop the topic's vector collection.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::Rag`] if the backend fails.
    pub async fn delete_topic_index(&self, topic_id: Uuid) -> Result<()> {
        self.index.delete_collection(&topic_id.to_string()).await?;
        Ok(())
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    let plain = !filename.is_empty()
        && !filename.contains(['/', '\\'])
        && filename != "."
        && filename != "..";
    if !plain {
        return Err(QuestError::Validation(format!("invalid file name '{filename}'")));
    }

    let extension = filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(QuestError::Validation(format!("'{filename}' is not a PDF or text document"))),
    }
}
