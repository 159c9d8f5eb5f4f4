//! Error types for the `mindquest-rag` crate.

use thiserror::Error;

/// Errors that can occur while ingesting, indexing or retrieving documents.
#[derive(Debug, Error)]
pub enum RagError {
    /// The byte stream is not a parseable paginated text document.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// An error occurred during chunking.
    #[error("Chunking error: {0}")]
    Chunking(String),

    /// A single call to the embedding provider failed.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding service kept failing after every retry.
    #[error("Embedding service failed after {attempts} attempts: {message}")]
    EmbeddingService {
        /// Number of attempts made for the failing batch.
        attempts: u32,
        /// The last provider error.
        message: String,
    },

    /// Search against a topic that has never been indexed.
    #[error("No vector collection exists for topic '{topic_id}'")]
    CollectionNotFound {
        /// The topic that was searched.
        topic_id: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStore {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RagError {
    pub(crate) fn vector_store(backend: &str, message: impl Into<String>) -> Self {
        Self::VectorStore { backend: backend.to_string(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
