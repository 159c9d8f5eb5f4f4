//! Document ingestion and retrieval for MindQuest.
//!
//! This crate provides:
//! - Paginated text extraction ([`PaginatedTextExtractor`])
//! - Recursive character chunking with global chunk indices ([`RecursiveChunker`])
//! - A batching, retrying embedding client ([`EmbeddingClient`])
//! - A topic-partitioned vector index over pluggable backends ([`VectorIndex`])
//! - The extract → chunk → embed → index pipeline ([`IngestPipeline`])
//! - Randomized diversity retrieval ([`DiversityRetriever`])
//!
//! # Feature flags
//!
//! - `openai`: [`OpenAIEmbeddingProvider`]
//! - `qdrant`: [`QdrantVectorStore`]
//! - `full`: both

mod chunking;
mod config;
mod document;
mod embedding;
mod error;
mod extract;
mod index;
mod inmemory;
mod pipeline;
mod retriever;
mod vectorstore;

#[cfg(feature = "openai")]
mod openai;
#[cfg(feature = "qdrant")]
mod qdrant;

pub use chunking::{Chunker, DEFAULT_SEPARATORS, RecursiveChunker, chunk_pages};
pub use config::{MAX_EMBEDDING_BATCH_SIZE, RagConfig, RagConfigBuilder};
pub use document::{Chunk, ChunkProvenance, Page, SearchResult, VectorRecord, record_id};
pub use embedding::{EmbeddingClient, EmbeddingProvider};
pub use error::{RagError, Result};
pub use extract::{PaginatedTextExtractor, TextExtractor, normalize_page_text};
pub use index::{VectorIndex, collection_name};
pub use inmemory::{InMemoryVectorStore, cosine_similarity};
pub use pipeline::{IngestPipeline, IngestPipelineBuilder, IngestReport};
pub use retriever::{DiversityRetriever, sample_pool};
pub use vectorstore::VectorStore;

#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
