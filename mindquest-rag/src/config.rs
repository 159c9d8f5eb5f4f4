//! Configuration for ingestion and retrieval.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Upper bound on texts per embedding request.
pub const MAX_EMBEDDING_BATCH_SIZE: usize = 100;

/// Configuration parameters for chunking, embedding, indexing and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks of the same page.
    pub chunk_overlap: usize,
    /// Texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Attempts per embedding batch before giving up.
    pub embedding_max_attempts: u32,
    /// Base delay of the linear embedding backoff (`attempt * delay`).
    #[serde(with = "duration_millis")]
    pub embedding_retry_delay: Duration,
    /// Records written per vector store upsert call.
    pub upsert_batch_size: usize,
    /// Number of context chunks handed to quiz generation.
    pub context_chunks: usize,
    /// Candidate pool size as a multiple of `context_chunks`.
    pub candidate_multiplier: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            embedding_batch_size: MAX_EMBEDDING_BATCH_SIZE,
            embedding_max_attempts: 3,
            embedding_retry_delay: Duration::from_secs(2),
            upsert_batch_size: 100,
            context_chunks: 10,
            candidate_multiplier: 3,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `embedding_batch_size` is outside `1..=100`
    /// - `embedding_max_attempts`, `upsert_batch_size`, `context_chunks` or
    ///   `candidate_multiplier` is zero
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.embedding_batch_size == 0 || self.embedding_batch_size > MAX_EMBEDDING_BATCH_SIZE {
            return Err(RagError::Config(format!(
                "embedding_batch_size ({}) must be between 1 and {MAX_EMBEDDING_BATCH_SIZE}",
                self.embedding_batch_size
            )));
        }
        if self.embedding_max_attempts == 0 {
            return Err(RagError::Config("embedding_max_attempts must be at least 1".to_string()));
        }
        if self.upsert_batch_size == 0 {
            return Err(RagError::Config("upsert_batch_size must be greater than zero".to_string()));
        }
        if self.context_chunks == 0 || self.candidate_multiplier == 0 {
            return Err(RagError::Config(
                "context_chunks and candidate_multiplier must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set how many texts go into one embedding request.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Set the number of attempts per embedding batch.
    pub fn embedding_max_attempts(mut self, attempts: u32) -> Self {
        self.config.embedding_max_attempts = attempts;
        self
    }

    /// Set the base delay of the linear embedding backoff.
    pub fn embedding_retry_delay(mut self, delay: Duration) -> Self {
        self.config.embedding_retry_delay = delay;
        self
    }

    /// Set the number of records per upsert call.
    pub fn upsert_batch_size(mut self, size: usize) -> Self {
        self.config.upsert_batch_size = size;
        self
    }

    /// Set the number of context chunks returned by the diversity retriever.
    pub fn context_chunks(mut self, k: usize) -> Self {
        self.config.context_chunks = k;
        self
    }

    /// Set the candidate pool multiplier of the diversity retriever.
    pub fn candidate_multiplier(mut self, multiplier: usize) -> Self {
        self.config.candidate_multiplier = multiplier;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RagConfig::default().validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = RagConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn embedding_batch_size_is_capped() {
        assert!(RagConfig::builder().embedding_batch_size(101).build().is_err());
        assert!(RagConfig::builder().embedding_batch_size(0).build().is_err());
        assert!(RagConfig::builder().embedding_batch_size(100).build().is_ok());
    }

    #[test]
    fn retry_delay_deserializes_from_millis() {
        let config: RagConfig =
            serde_json::from_str(r#"{"embedding_retry_delay": 250, "chunk_size": 500}"#).unwrap();
        assert_eq!(config.embedding_retry_delay, Duration::from_millis(250));
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 200);
    }
}
