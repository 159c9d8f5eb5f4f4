//! Ingestion pipeline: extract → chunk → embed → index.
//!
//! [`IngestPipeline`] runs the four stages for one document, strictly in
//! order. It keeps no per-document status; callers that track processing
//! state wrap it.
//!
//! # Example
//!
//! ```rust,ignore
//! use mindquest_rag::{IngestPipeline, RagConfig, InMemoryVectorStore};
//!
//! let pipeline = IngestPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! let report = pipeline.ingest("topic-1", "doc-1", &bytes).await?;
//! ```

use std::sync::Arc;

use tracing::{error, info};

use crate::chunking::{Chunker, RecursiveChunker, chunk_pages};
use crate::config::RagConfig;
use crate::document::Chunk;
use crate::embedding::{EmbeddingClient, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::extract::{PaginatedTextExtractor, TextExtractor};
use crate::index::VectorIndex;
use crate::vectorstore::VectorStore;

/// Counts produced by one successful ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Pages with text.
    pub page_count: usize,
    /// Chunks embedded and written to the index.
    pub chunk_count: usize,
}

/// Orchestrates the ingestion stages for single documents.
///
/// Construct one via [`IngestPipeline::builder()`].
#[derive(Clone)]
pub struct IngestPipeline {
    config: RagConfig,
    extractor: Arc<dyn TextExtractor>,
    chunker: Arc<dyn Chunker>,
    embedder: EmbeddingClient,
    index: VectorIndex,
}

impl IngestPipeline {
    /// Create a new [`IngestPipelineBuilder`].
    pub fn builder() -> IngestPipelineBuilder {
        IngestPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The embedding client used for chunks (and shared with retrieval).
    pub fn embedder(&self) -> &EmbeddingClient {
        &self.embedder
    }

    /// The vector index chunks are written to.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Ingest one document of `topic_id`.
    ///
    /// Existing records of `document_id` are replaced. A document without
    /// any text succeeds with zero chunks.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage: [`RagError::Extraction`],
    /// [`RagError::EmbeddingService`] or [`RagError::VectorStore`].
    pub async fn ingest(
        &self,
        topic_id: &str,
        document_id: &str,
        bytes: &[u8],
    ) -> Result<IngestReport> {
        // 1. Extract
        let pages = self.extractor.extract(bytes).map_err(|e| {
            error!(document.id = document_id, error = %e, "extraction failed");
            e
        })?;

        // 2. Chunk
        let chunks: Vec<Chunk> =
            chunk_pages(self.chunker.as_ref(), document_id, topic_id, &pages).collect();
        info!(document.id = document_id, page_count = pages.len(), chunk_count = chunks.len(), "chunked document");

        // 3. Embed
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedder.embed(&texts).await.map_err(|e| {
            error!(document.id = document_id, error = %e, "embedding failed during ingestion");
            e
        })?;

        // 4. Index
        let chunk_count = self
            .index
            .replace_document(topic_id, document_id, chunks, vectors)
            .await
            .map_err(|e| {
                error!(document.id = document_id, error = %e, "upsert failed during ingestion");
                e
            })?;

        info!(document.id = document_id, topic.id = topic_id, chunk_count, "ingested document");
        Ok(IngestReport { page_count: pages.len(), chunk_count })
    }
}

/// Builder for constructing an [`IngestPipeline`].
///
/// `embedding_provider` and `vector_store` are required. The extractor
/// defaults to [`PaginatedTextExtractor`] and the chunker to a
/// [`RecursiveChunker`] sized from the config.
#[derive(Default)]
pub struct IngestPipelineBuilder {
    config: Option<RagConfig>,
    extractor: Option<Arc<dyn TextExtractor>>,
    chunker: Option<Arc<dyn Chunker>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    dimensions: Option<usize>,
}

impl IngestPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the text extractor.
    pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Override the chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the configured embedding dimension (defaults to the provider's).
    pub fn dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Build the [`IngestPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing, the config
    /// is invalid, or the configured dimension differs from the provider's.
    pub fn build(self) -> Result<IngestPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let store = self
            .vector_store
            .ok_or_else(|| RagError::Config("vector_store is required".to_string()))?;

        let dimensions = self.dimensions.unwrap_or_else(|| provider.dimensions());
        if dimensions != provider.dimensions() {
            return Err(RagError::Config(format!(
                "configured embedding dimension {dimensions} differs from provider dimension {}",
                provider.dimensions()
            )));
        }

        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(
                RecursiveChunker::new(config.chunk_size, config.chunk_overlap)
                    .map_err(|e| RagError::Config(e.to_string()))?,
            ),
        };

        Ok(IngestPipeline {
            extractor: self.extractor.unwrap_or_else(|| Arc::new(PaginatedTextExtractor::new())),
            chunker,
            embedder: EmbeddingClient::new(provider, &config),
            index: VectorIndex::new(store, dimensions, &config),
            config,
        })
    }
}
