//! Recursive character chunking.
//!
//! [`RecursiveChunker`] splits text on the coarsest separator that yields
//! pieces within budget (paragraph break, line break, space, then single
//! characters) and merges the pieces back into chunks of at most
//! `chunk_size` characters. Consecutive chunks share at most
//! `chunk_overlap` characters of trailing context.
//!
//! [`chunk_pages`] runs a [`Chunker`] over extracted pages and numbers the
//! chunks across the whole document.

use std::collections::VecDeque;

use crate::document::{Chunk, ChunkProvenance, Page};
use crate::error::{RagError, Result};

/// Separators tried in order, coarsest first. The empty separator splits
/// into single characters and always succeeds.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// A strategy for splitting page text into bounded pieces.
pub trait Chunker: Send + Sync {
    /// Split `text` into chunk texts, in order.
    ///
    /// Returns an empty `Vec` for blank input.
    fn split_text(&self, text: &str) -> Vec<String>;
}

/// Splits text hierarchically: paragraphs → lines → words → characters.
///
/// Lengths are counted in characters, not bytes.
///
/// # Example
///
/// ```rust,ignore
/// use mindquest_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(1000, 200)?;
/// let pieces = chunker.split_text(&page.text);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Chunking`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(RagError::Chunking(format!(
                "invalid chunk budget: size {chunk_size}, overlap {chunk_overlap}"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Maximum characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Maximum characters shared by consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let position = separators.iter().position(|s| s.is_empty() || text.contains(s));
        let (separator, finer) = match position {
            Some(i) => (separators[i], &separators[i + 1..]),
            None => ("", &[][..]),
        };

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).map(str::to_string).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<String> = Vec::new();

        for piece in pieces {
            if char_len(&piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.extend(split_by_size(&piece, self.chunk_size, self.chunk_overlap));
            } else {
                chunks.extend(self.split_recursive(&piece, finer));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }

        chunks
    }

    /// Greedily join pieces with `separator` while they fit, carrying the
    /// trailing pieces (at most `chunk_overlap` characters) into the next chunk.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joiner = if current.is_empty() { 0 } else { separator_len };

            if total + len + joiner > self.chunk_size && !current.is_empty() {
                if let Some(chunk) = join_trimmed(&current, separator) {
                    chunks.push(chunk);
                }
                loop {
                    let joiner = if current.is_empty() { 0 } else { separator_len };
                    let over_overlap = total > self.chunk_overlap;
                    let no_room = total > 0 && total + len + joiner > self.chunk_size;
                    if !(over_overlap || no_room) {
                        break;
                    }
                    let Some(first) = current.pop_front() else { break };
                    let joiner = if current.is_empty() { 0 } else { separator_len };
                    total -= char_len(first) + joiner;
                }
            }

            let joiner = if current.is_empty() { 0 } else { separator_len };
            current.push_back(piece);
            total += len + joiner;
        }

        if let Some(chunk) = join_trimmed(&current, separator) {
            chunks.push(chunk);
        }

        chunks
    }
}

impl Chunker for RecursiveChunker {
    fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split_recursive(text, &DEFAULT_SEPARATORS)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join_trimmed(pieces: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

/// Character-based splitting with overlap.
fn split_by_size(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Chunk every page of a document, numbering chunks across the whole document.
///
/// The returned iterator is lazy (pages are split as they are reached) and
/// holds no state beyond its borrows, so calling this again restarts from
/// the first page with `chunk_index` 0.
pub fn chunk_pages<'a>(
    chunker: &'a dyn Chunker,
    document_id: &'a str,
    topic_id: &'a str,
    pages: &'a [Page],
) -> impl Iterator<Item = Chunk> + 'a {
    pages
        .iter()
        .flat_map(move |page| {
            chunker.split_text(&page.text).into_iter().map(move |text| (page.page_number, text))
        })
        .zip(0u32..)
        .map(move |((page_number, text), chunk_index)| Chunk {
            text,
            provenance: ChunkProvenance {
                document_id: document_id.to_string(),
                topic_id: topic_id.to_string(),
                page_number,
                chunk_index,
            },
        })
}
