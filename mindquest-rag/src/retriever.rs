//! Diversity-aware retrieval.
//!
//! Nearest-neighbor search is deterministic for a given query, so repeated
//! quiz generations on the same topic would see the same context. The
//! [`DiversityRetriever`] widens the candidate pool and samples from it.

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::document::SearchResult;
use crate::embedding::EmbeddingClient;
use crate::error::Result;
use crate::index::VectorIndex;

/// Samples `k` results uniformly without replacement from a `multiplier * k`
/// nearest-neighbor pool.
#[derive(Debug, Clone)]
pub struct DiversityRetriever {
    embedder: EmbeddingClient,
    index: VectorIndex,
    candidate_multiplier: usize,
}

impl DiversityRetriever {
    /// Create a retriever using the candidate multiplier of `config`.
    pub fn new(embedder: EmbeddingClient, index: VectorIndex, config: &RagConfig) -> Self {
        Self { embedder, index, candidate_multiplier: config.candidate_multiplier.max(1) }
    }

    /// Retrieve `k` diverse chunks of `topic_id` relevant to `query`.
    ///
    /// If the diverse path fails for any reason, a plain top-`k` search is
    /// attempted instead and its error (if any) is returned.
    ///
    /// # Errors
    ///
    /// Returns the fallback search error, e.g. [`RagError::CollectionNotFound`]
    /// or [`RagError::EmbeddingService`].
    ///
    /// [`RagError::CollectionNotFound`]: crate::RagError::CollectionNotFound
    /// [`RagError::EmbeddingService`]: crate::RagError::EmbeddingService
    pub async fn retrieve(&self, topic_id: &str, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        match self.retrieve_diverse(topic_id, query, k).await {
            Ok(results) => Ok(results),
            Err(e) => {
                warn!(topic.id = topic_id, error = %e, "diverse retrieval failed, falling back to top-k");
                let query_vector = self.embedder.embed_one(query).await?;
                self.index.search(topic_id, &query_vector, k, None).await
            }
        }
    }

    async fn retrieve_diverse(&self, topic_id: &str, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let query_vector = self.embedder.embed_one(query).await?;
        let pool_size = k.saturating_mul(self.candidate_multiplier);
        let pool = self.index.search(topic_id, &query_vector, pool_size, None).await?;
        debug!(topic.id = topic_id, pool_size = pool.len(), "retrieved candidate pool");

        let selected = sample_pool(pool, k, &mut rand::thread_rng());
        info!(topic.id = topic_id, selected = selected.len(), "diverse retrieval");
        Ok(selected)
    }
}

/// Choose `k` members of `pool` uniformly at random without replacement.
///
/// A pool with at most `k` members is returned whole, in its original order.
pub fn sample_pool<R: Rng + ?Sized>(pool: Vec<SearchResult>, k: usize, rng: &mut R) -> Vec<SearchResult> {
    if pool.len() <= k {
        return pool;
    }
    pool.choose_multiple(rng, k).cloned().collect()
}
