//! Text extraction from paginated documents.
//!
//! [`PaginatedTextExtractor`] accepts PDF bytes (detected by the `%PDF-`
//! header) and UTF-8 text where pages are separated by form feeds (`\x0c`).
//! Every page is normalized with [`normalize_page_text`]; pages that end up
//! empty are dropped.

use tracing::{debug, error, info};

use crate::document::Page;
use crate::error::{RagError, Result};

const PDF_MAGIC: &[u8] = b"%PDF-";
const PAGE_BREAK: char = '\u{0c}';

/// Turns a raw document byte stream into ordered, cleaned pages.
pub trait TextExtractor: Send + Sync {
    /// Extract the non-empty pages of `bytes` in page order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Extraction`] if `bytes` is not a parseable
    /// paginated text document.
    fn extract(&self, bytes: &[u8]) -> Result<Vec<Page>>;
}

/// Trim every line, drop blank lines and join the rest with `\n`.
pub fn normalize_page_text(raw: &str) -> String {
    raw.lines().map(str::trim).filter(|line| !line.is_empty()).collect::<Vec<_>>().join("\n")
}

/// Number raw page texts from 1 and keep only those with content.
fn into_pages<I, S>(raw_pages: I) -> Vec<Page>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw_pages
        .into_iter()
        .zip(1u32..)
        .filter_map(|(raw, page_number)| {
            let text = normalize_page_text(raw.as_ref());
            if text.is_empty() { None } else { Some(Page { page_number, text }) }
        })
        .collect()
}

/// Extractor for PDF documents and form-feed separated text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaginatedTextExtractor;

impl PaginatedTextExtractor {
    /// Create a new extractor.
    pub fn new() -> Self {
        Self
    }

    fn extract_pdf(bytes: &[u8]) -> Result<Vec<String>> {
        pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| {
            error!(error = %e, "failed to extract text from PDF");
            RagError::Extraction(format!("unreadable PDF: {e}"))
        })
    }

    fn extract_text(bytes: &[u8]) -> Result<Vec<String>> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            error!(error = %e, "document is neither PDF nor UTF-8 text");
            RagError::Extraction(format!("document is neither PDF nor UTF-8 text: {e}"))
        })?;
        Ok(text.split(PAGE_BREAK).map(str::to_string).collect())
    }
}

impl TextExtractor for PaginatedTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<Page>> {
        if bytes.is_empty() {
            return Err(RagError::Extraction("document is empty".to_string()));
        }

        let raw_pages = if bytes.starts_with(PDF_MAGIC) {
            debug!(size = bytes.len(), "extracting text from PDF");
            Self::extract_pdf(bytes)?
        } else {
            debug!(size = bytes.len(), "extracting text from paginated text");
            Self::extract_text(bytes)?
        };

        let total = raw_pages.len();
        let pages = into_pages(raw_pages);
        info!(page_count = pages.len(), skipped = total - pages.len(), "extracted pages");
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_lines() {
        let raw = "  IAM policies  \n\n\t\n   attach to roles\n";
        assert_eq!(normalize_page_text(raw), "IAM policies\nattach to roles");
    }

    #[test]
    fn splits_form_feed_pages_and_skips_blank_ones() {
        let bytes = "page one\n  text \x0c   \n \x0cpage three".as_bytes();
        let pages = PaginatedTextExtractor::new().extract(bytes).unwrap();
        assert_eq!(
            pages,
            vec![
                Page { page_number: 1, text: "page one\ntext".to_string() },
                Page { page_number: 3, text: "page three".to_string() },
            ]
        );
    }

    #[test]
    fn rejects_binary_garbage() {
        let err = PaginatedTextExtractor::new().extract(&[0xff, 0xfe, 0x00, 0x9f]).unwrap_err();
        assert!(matches!(err, RagError::Extraction(_)));
    }

    #[test]
    fn rejects_truncated_pdf() {
        let err = PaginatedTextExtractor::new().extract(b"%PDF-1.7\nnot really").unwrap_err();
        assert!(matches!(err, RagError::Extraction(_)));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(PaginatedTextExtractor::new().extract(b"").is_err());
    }
}
