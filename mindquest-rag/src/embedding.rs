//! Embedding providers and the batching, retrying embedding client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::{MAX_EMBEDDING_BATCH_SIZE, RagConfig};
use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap one embedding backend (OpenAI, a local model, a test
/// double) and make exactly one upstream call per [`embed_batch`] call. They
/// do not retry; [`EmbeddingClient`] owns batching and retries.
///
/// [`embed_batch`]: EmbeddingProvider::embed_batch
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate one embedding per input text, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Provider name used in logs and errors.
    fn name(&self) -> &str {
        "embedding"
    }
}

/// Converts texts into vectors in fixed-size batches with bounded retries.
///
/// Each batch is attempted up to `max_attempts` times, sleeping
/// `attempt * retry_delay` between attempts. When a batch exhausts its
/// attempts the whole [`embed`](EmbeddingClient::embed) call fails with
/// [`RagError::EmbeddingService`]; vectors of earlier batches are dropped.
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    max_attempts: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("provider", &self.provider.name())
            .field("batch_size", &self.batch_size)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

impl EmbeddingClient {
    /// Create a client with the batching and retry settings of `config`.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &RagConfig) -> Self {
        Self {
            provider,
            batch_size: config.embedding_batch_size.clamp(1, MAX_EMBEDDING_BATCH_SIZE),
            max_attempts: config.embedding_max_attempts.max(1),
            retry_delay: config.embedding_retry_delay,
        }
    }

    /// Dimensionality of the vectors this client returns.
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Embed `texts`, returning one vector per text in the same order.
    ///
    /// Empty input returns an empty result without calling the provider.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingService`] if any batch keeps failing.
    pub async fn embed<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = texts.iter().map(AsRef::as_ref).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for (batch_index, batch) in texts.chunks(self.batch_size).enumerate() {
            let embedded = self.embed_batch_with_retry(batch_index, batch).await?;
            vectors.extend(embedded);
        }

        info!(provider = self.provider.name(), count = vectors.len(), "generated embeddings");
        Ok(vectors)
    }

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingService`] if the provider keeps failing.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text]).await?.into_iter().next().ok_or_else(|| RagError::EmbeddingService {
            attempts: self.max_attempts,
            message: "provider returned no vector".to_string(),
        })
    }

    async fn embed_batch_with_retry(
        &self,
        batch_index: usize,
        batch: &[&str],
    ) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 1;
        loop {
            debug!(provider = self.provider.name(), batch_index, attempt, size = batch.len(), "embedding batch");
            let outcome = match self.provider.embed_batch(batch).await {
                Ok(vectors) if vectors.len() == batch.len() => return Ok(vectors),
                Ok(vectors) => format!("expected {} vectors, got {}", batch.len(), vectors.len()),
                Err(e) => e.to_string(),
            };

            warn!(provider = self.provider.name(), batch_index, attempt, error = %outcome, "embedding attempt failed");
            if attempt >= self.max_attempts {
                error!(
                    provider = self.provider.name(),
                    batch_index,
                    attempts = attempt,
                    "embedding retries exhausted"
                );
                return Err(RagError::EmbeddingService { attempts: attempt, message: outcome });
            }

            tokio::time::sleep(self.retry_delay * attempt).await;
            attempt += 1;
        }
    }
}
