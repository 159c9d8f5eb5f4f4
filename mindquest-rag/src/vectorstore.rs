//! Vector store backend trait.

use async_trait::async_trait;

use crate::document::{SearchResult, VectorRecord};
use crate::error::Result;

/// A storage backend for vector records with cosine similarity search.
///
/// Backends work on named collections and know nothing about topics; the
/// [`VectorIndex`](crate::VectorIndex) maps topics to collection names.
///
/// # Example
///
/// ```rust,ignore
/// use mindquest_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("cert_1", 1536).await?;
/// store.upsert("cert_1", &records).await?;
/// let results = store.search("cert_1", &query, 5, None).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Whether the named collection exists.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Delete a named collection and all its records.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert or overwrite records by id. The collection must exist.
    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()>;

    /// Delete every record whose provenance names `document_id`.
    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<()>;

    /// Return the `top_k` records most similar to `vector`, best first,
    /// optionally restricted to one source document.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<SearchResult>>;

    /// Backend name used in logs and errors.
    fn backend(&self) -> &str;
}
