//! In-memory vector store using cosine similarity.
//!
//! [`InMemoryVectorStore`] keeps records in a `HashMap` behind a
//! `tokio::sync::RwLock`. It is meant for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{SearchResult, VectorRecord};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "InMemory";

#[derive(Debug, Default)]
struct Collection {
    dimensions: usize,
    records: HashMap<String, VectorRecord>,
}

/// An in-memory vector store using cosine similarity for search.
///
/// Collections are stored as nested maps: collection name → record id → record.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a collection, `None` if it does not exist.
    pub async fn len(&self, collection: &str) -> Option<usize> {
        self.collections.read().await.get(collection).map(|c| c.records.len())
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn missing(collection: &str) -> RagError {
    RagError::vector_store(BACKEND, format!("collection '{collection}' does not exist"))
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| Collection { dimensions, records: HashMap::new() });
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        if let Some(bad) = records.iter().find(|r| r.vector.len() != store.dimensions) {
            return Err(RagError::vector_store(
                BACKEND,
                format!(
                    "record '{}' has {} dimensions, collection expects {}",
                    bad.id,
                    bad.vector.len(),
                    store.dimensions
                ),
            ));
        }
        for record in records {
            store.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        store.records.retain(|_, r| r.provenance.document_id != document_id);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut scored: Vec<SearchResult> = store
            .records
            .values()
            .filter(|r| document_id.is_none_or(|id| r.provenance.document_id == id))
            .map(|r| SearchResult {
                text: r.text.clone(),
                score: cosine_similarity(&r.vector, vector),
                provenance: r.provenance.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    fn backend(&self) -> &str {
        BACKEND
    }
}
