//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//! This module is only available when the `qdrant` feature is enabled.

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::debug;

use crate::document::{ChunkProvenance, SearchResult, VectorRecord};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "qdrant";

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// Collections use cosine distance. Text and provenance are stored as flat
/// payload fields so that `document_id` can be used as a filter.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Create a new Qdrant vector store connecting to the given URL.
    pub fn new(url: &str, api_key: Option<&str>) -> Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder.build().map_err(Self::map_err)?;
        Ok(Self { client })
    }

    /// Create a new Qdrant vector store from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::vector_store(BACKEND, e.to_string())
    }

    fn document_filter(document_id: &str) -> Filter {
        Filter::must([Condition::matches("document_id", document_id.to_string())])
    }

    fn payload(record: &VectorRecord) -> Payload {
        let value = serde_json::json!({
            "text": record.text,
            "topic_id": record.provenance.topic_id,
            "document_id": record.provenance.document_id,
            "page_number": record.provenance.page_number,
            "chunk_index": record.provenance.chunk_index,
        });
        Payload::try_from(value).unwrap_or_default()
    }

    fn string_field(payload: &std::collections::HashMap<String, QdrantValue>, key: &str) -> String {
        match payload.get(key).and_then(|v| v.kind.as_ref()) {
            Some(Kind::StringValue(s)) => s.clone(),
            _ => String::new(),
        }
    }

    fn u32_field(payload: &std::collections::HashMap<String, QdrantValue>, key: &str) -> u32 {
        match payload.get(key).and_then(|v| v.kind.as_ref()) {
            Some(Kind::IntegerValue(n)) => u32::try_from(*n).unwrap_or_default(),
            Some(Kind::DoubleValue(n)) => *n as u32,
            _ => 0,
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if self.collection_exists(name).await? {
            debug!(collection = name, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = name, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.client.collection_exists(name).await.map_err(Self::map_err)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        if !self.collection_exists(name).await? {
            return Ok(());
        }
        self.client.delete_collection(name).await.map_err(Self::map_err)?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = records
            .iter()
            .map(|r| PointStruct::new(r.id.clone(), r.vector.clone(), Self::payload(r)))
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection, count = records.len(), "upserted records to qdrant");
        Ok(())
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(Self::document_filter(document_id))
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection, document_id, "deleted document records from qdrant");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let mut request =
            SearchPointsBuilder::new(collection, vector.to_vec(), top_k as u64).with_payload(true);
        if let Some(document_id) = document_id {
            request = request.filter(Self::document_filter(document_id));
        }

        let response = self.client.search_points(request).await.map_err(Self::map_err)?;

        let results = response
            .result
            .into_iter()
            .map(|scored| SearchResult {
                text: Self::string_field(&scored.payload, "text"),
                score: scored.score,
                provenance: ChunkProvenance {
                    document_id: Self::string_field(&scored.payload, "document_id"),
                    topic_id: Self::string_field(&scored.payload, "topic_id"),
                    page_number: Self::u32_field(&scored.payload, "page_number"),
                    chunk_index: Self::u32_field(&scored.payload, "chunk_index"),
                },
            })
            .collect();

        Ok(results)
    }

    fn backend(&self) -> &str {
        BACKEND
    }
}
