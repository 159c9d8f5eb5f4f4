//! Data types for pages, chunks, vector records and search results.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One page of extracted, whitespace-normalized text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number in the source document.
    pub page_number: u32,
    /// Non-blank lines of the page, trimmed and joined with `\n`.
    pub text: String,
}

/// Where a chunk came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChunkProvenance {
    /// The source document.
    pub document_id: String,
    /// The topic (certification) the document belongs to.
    pub topic_id: String,
    /// 1-based page number the chunk was cut from.
    pub page_number: u32,
    /// Position of the chunk within the whole document, starting at 0.
    pub chunk_index: u32,
}

/// A bounded span of extracted text with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text.
    pub text: String,
    /// Where the text came from.
    pub provenance: ChunkProvenance,
}

impl Chunk {
    /// Stable record id derived from `(document_id, chunk_index)`.
    ///
    /// Re-ingesting a document produces the same ids for the same positions.
    pub fn record_id(&self) -> String {
        record_id(&self.provenance.document_id, self.provenance.chunk_index)
    }
}

/// Stable record id for the chunk at `chunk_index` of `document_id`.
pub fn record_id(document_id: &str, chunk_index: u32) -> String {
    let name = format!("{document_id}:{chunk_index}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// A chunk stored in the vector index together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    /// Record identity, see [`Chunk::record_id`].
    pub id: String,
    /// Embedding of `text`.
    pub vector: Vec<f32>,
    /// The chunk text.
    pub text: String,
    /// Where the text came from.
    pub provenance: ChunkProvenance,
}

impl VectorRecord {
    /// Pair a chunk with its embedding.
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self { id: chunk.record_id(), vector, text: chunk.text, provenance: chunk.provenance }
    }
}

/// A retrieved chunk paired with its cosine similarity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The chunk text.
    pub text: String,
    /// Similarity score (higher is more relevant).
    pub score: f32,
    /// Where the text came from.
    pub provenance: ChunkProvenance,
}
