//! Error types for the `mindquest-quiz` crate.

use mindquest_rag::RagError;
use thiserror::Error;

/// Errors surfaced by document processing, quiz generation and evaluation.
#[derive(Debug, Error)]
pub enum QuestError {
    /// The request is malformed or not allowed in the current state.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A required entity does not exist (or is not visible to the requester).
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Entity kind, e.g. `"quiz"`.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// The generation capability returned output that does not match the
    /// required question set shape.
    #[error("Generation schema error: {0}")]
    GenerationSchema(String),

    /// The generation capability call itself failed.
    #[error("Generation error: {0}")]
    Generation(String),

    /// An optimistic concurrency check failed; the caller may retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The entity store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The object locator failed to store or fetch bytes.
    #[error("Locator error: {0}")]
    Locator(String),

    /// The ingestion queue has no free slot.
    #[error("Ingestion queue is full")]
    QueueFull,

    /// The ingestion queue has been shut down.
    #[error("Ingestion queue is closed")]
    QueueClosed,

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An error from the ingestion or retrieval layer.
    #[error(transparent)]
    Rag(#[from] RagError),
}

impl QuestError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }
}

/// A convenience result type for quiz operations.
pub type Result<T> = std::result::Result<T, QuestError>;
