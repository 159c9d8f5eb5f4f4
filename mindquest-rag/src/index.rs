//! Topic-partitioned vector index.
//!
//! [`VectorIndex`] maps each topic to one collection named by
//! [`collection_name`], creates collections lazily on first write and
//! writes records in fixed-size batches.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::document::{Chunk, SearchResult, VectorRecord};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Deterministic collection name for a topic.
pub fn collection_name(topic_id: &str) -> String {
    format!("cert_{}", topic_id.replace('-', "_"))
}

/// Per-topic vector index over a [`VectorStore`] backend.
///
/// The configured dimensionality is used when collections are created; the
/// index trusts that every vector it is handed has that length.
#[derive(Clone)]
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    dimensions: usize,
    upsert_batch_size: usize,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("backend", &self.store.backend())
            .field("dimensions", &self.dimensions)
            .field("upsert_batch_size", &self.upsert_batch_size)
            .finish()
    }
}

impl VectorIndex {
    /// Create an index writing `dimensions`-wide vectors to `store`.
    pub fn new(store: Arc<dyn VectorStore>, dimensions: usize, config: &RagConfig) -> Self {
        Self { store, dimensions, upsert_batch_size: config.upsert_batch_size.max(1) }
    }

    /// Dimensionality of the collections this index creates.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Create the topic's collection if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStore`] if the backend fails.
    pub async fn ensure_collection(&self, topic_id: &str) -> Result<()> {
        self.store.create_collection(&collection_name(topic_id), self.dimensions).await
    }

    /// Whether the topic has ever been indexed.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStore`] if the backend fails.
    pub async fn collection_exists(&self, topic_id: &str) -> Result<bool> {
        self.store.collection_exists(&collection_name(topic_id)).await
    }

    /// Write `(vector, text, provenance)` records for `chunks`.
    ///
    /// Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStore`] if the counts differ or the backend fails.
    pub async fn upsert(
        &self,
        topic_id: &str,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<usize> {
        if chunks.len() != vectors.len() {
            return Err(RagError::vector_store(
                self.store.backend(),
                format!("{} chunks but {} vectors", chunks.len(), vectors.len()),
            ));
        }
        if chunks.is_empty() {
            return Ok(0);
        }

        self.ensure_collection(topic_id).await?;
        let collection = collection_name(topic_id);
        let records: Vec<VectorRecord> =
            chunks.into_iter().zip(vectors).map(|(c, v)| VectorRecord::new(c, v)).collect();

        for batch in records.chunks(self.upsert_batch_size) {
            self.store.upsert(&collection, batch).await?;
            debug!(collection = %collection, count = batch.len(), "upserted batch");
        }

        info!(collection = %collection, count = records.len(), "upserted records");
        Ok(records.len())
    }

    /// Replace every record of `document_id` with the given chunks.
    ///
    /// Existing records of the document are deleted first, so a shorter
    /// re-ingestion leaves no stale records behind.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStore`] if the backend fails.
    pub async fn replace_document(
        &self,
        topic_id: &str,
        document_id: &str,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<usize> {
        if self.collection_exists(topic_id).await? {
            self.store.delete_document(&collection_name(topic_id), document_id).await?;
        }
        self.upsert(topic_id, chunks, vectors).await
    }

    /// Nearest-neighbor search within a topic, optionally limited to one document.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CollectionNotFound`] if the topic was never indexed,
    /// or [`RagError::VectorStore`] if the backend fails.
    pub async fn search(
        &self,
        topic_id: &str,
        query_vector: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        if !self.collection_exists(topic_id).await? {
            return Err(RagError::CollectionNotFound { topic_id: topic_id.to_string() });
        }
        let results = self
            .store
            .search(&collection_name(topic_id), query_vector, top_k, document_id)
            .await?;
        debug!(topic.id = topic_id, result_count = results.len(), "vector search");
        Ok(results)
    }

    /// Delete every record of one document. No-op for a never-indexed topic.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStore`] if the backend fails.
    pub async fn delete_document(&self, topic_id: &str, document_id: &str) -> Result<()> {
        if !self.collection_exists(topic_id).await? {
            warn!(topic.id = topic_id, document.id = document_id, "no collection to delete from");
            return Ok(());
        }
        self.store.delete_document(&collection_name(topic_id), document_id).await
    }

    /// Drop the topic's collection.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStore`] if the backend fails.
    pub async fn delete_collection(&self, topic_id: &str) -> Result<()> {
        let name = collection_name(topic_id);
        self.store.delete_collection(&name).await?;
        info!(collection = %name, "deleted collection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkProvenance;
    use crate::inmemory::InMemoryVectorStore;

    fn chunk(document_id: &str, chunk_index: u32) -> Chunk {
        Chunk {
            text: format!("{document_id} chunk {chunk_index}"),
            provenance: ChunkProvenance {
                document_id: document_id.to_string(),
                topic_id: "topic-1".to_string(),
                page_number: 1,
                chunk_index,
            },
        }
    }

    fn index(store: Arc<InMemoryVectorStore>, batch: usize) -> VectorIndex {
        let config = RagConfig::builder().upsert_batch_size(batch).build().unwrap();
        VectorIndex::new(store, 2, &config)
    }

    #[test]
    fn collection_name_is_deterministic() {
        assert_eq!(
            collection_name("3f2a-91bc-0001"),
            collection_name("3f2a-91bc-0001"),
        );
        assert_eq!(collection_name("3f2a-91bc-0001"), "cert_3f2a_91bc_0001");
    }

    #[tokio::test]
    async fn search_on_unknown_topic_is_collection_not_found() {
        let index = index(Arc::new(InMemoryVectorStore::new()), 100);
        let err = index.search("nope", &[1.0, 0.0], 5, None).await.unwrap_err();
        assert!(matches!(err, RagError::CollectionNotFound { topic_id } if topic_id == "nope"));
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent() {
        let index = index(Arc::new(InMemoryVectorStore::new()), 100);
        index.ensure_collection("t").await.unwrap();
        index.ensure_collection("t").await.unwrap();
        assert!(index.collection_exists("t").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_writes_every_batch() {
        let store = Arc::new(InMemoryVectorStore::new());
        let index = index(store.clone(), 2);
        let chunks: Vec<Chunk> = (0..5).map(|i| chunk("doc", i)).collect();
        let vectors = vec![vec![1.0, 0.0]; 5];

        assert_eq!(index.upsert("topic-1", chunks, vectors).await.unwrap(), 5);
        assert_eq!(store.len(&collection_name("topic-1")).await, Some(5));
    }

    #[tokio::test]
    async fn replace_document_drops_stale_records() {
        let store = Arc::new(InMemoryVectorStore::new());
        let index = index(store.clone(), 100);
        let first: Vec<Chunk> = (0..4).map(|i| chunk("doc", i)).collect();
        index.replace_document("topic-1", "doc", first, vec![vec![1.0, 0.0]; 4]).await.unwrap();
        index
            .replace_document("topic-1", "other", vec![chunk("other", 0)], vec![vec![0.0, 1.0]])
            .await
            .unwrap();

        let second: Vec<Chunk> = (0..2).map(|i| chunk("doc", i)).collect();
        index.replace_document("topic-1", "doc", second, vec![vec![1.0, 0.0]; 2]).await.unwrap();

        assert_eq!(store.len(&collection_name("topic-1")).await, Some(3));
        let only_doc = index.search("topic-1", &[1.0, 0.0], 10, Some("doc")).await.unwrap();
        assert_eq!(only_doc.len(), 2);
        assert!(only_doc.iter().all(|r| r.provenance.document_id == "doc"));
    }

    #[tokio::test]
    async fn mismatched_counts_are_rejected() {
        let index = index(Arc::new(InMemoryVectorStore::new()), 100);
        let err = index.upsert("t", vec![chunk("d", 0)], vec![]).await.unwrap_err();
        assert!(matches!(err, RagError::VectorStore { .. }));
    }
}
