//! Service configuration.

use std::path::PathBuf;
use std::str::FromStr;

use mindquest_rag::RagConfig;
use serde::{Deserialize, Serialize};

use crate::error::{QuestError, Result};

/// Prefix of every environment variable read by [`QuestConfig::from_env`].
pub const ENV_PREFIX: &str = "MINDQUEST_";

/// Focus domains used when a learner has no weak domains yet.
pub const DEFAULT_FOCUS_DOMAINS: [&str; 3] = ["IAM", "EC2", "S3"];

/// Configuration for the quiz services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuestConfig {
    /// Embedding model name.
    pub embedding_model: String,
    /// Dimensionality of the embedding model (and every vector collection).
    pub embedding_dimensions: usize,
    /// Chat model used for quiz generation.
    pub generation_model: String,
    /// Sampling temperature for quiz generation.
    pub generation_temperature: f32,
    /// Completion token limit for quiz generation.
    pub generation_max_tokens: u32,
    /// Qdrant gRPC endpoint.
    pub qdrant_url: String,
    /// Root directory of the filesystem object locator.
    pub storage_root: PathBuf,
    /// Documents processed concurrently by the ingestion queue.
    pub ingest_workers: usize,
    /// Pending submissions the ingestion queue accepts before `QueueFull`.
    pub ingest_queue_capacity: usize,
    /// Focus domains used when no weak domains are known.
    pub default_focus_domains: Vec<String>,
    /// Chunking, embedding and retrieval settings.
    pub rag: RagConfig,
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            generation_model: "gpt-4o-mini".to_string(),
            generation_temperature: 0.7,
            generation_max_tokens: 2000,
            qdrant_url: "http://localhost:6334".to_string(),
            storage_root: PathBuf::from("storage"),
            ingest_workers: 2,
            ingest_queue_capacity: 64,
            default_focus_domains: DEFAULT_FOCUS_DOMAINS.iter().map(|d| d.to_string()).collect(),
            rag: RagConfig::default(),
        }
    }
}

impl QuestConfig {
    /// Read `MINDQUEST_*` environment variables over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::Config`] if a variable does not parse or the
    /// result fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    ///
    /// `lookup` receives full variable names, e.g. `MINDQUEST_QDRANT_URL`.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::Config`] on parse or validation failure.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut config = Self::default();

        if let Some(v) = var("EMBEDDING_MODEL") {
            config.embedding_model = v;
        }
        if let Some(v) = var("EMBEDDING_DIMENSIONS") {
            config.embedding_dimensions = parse("EMBEDDING_DIMENSIONS", &v)?;
        }
        if let Some(v) = var("GENERATION_MODEL") {
            config.generation_model = v;
        }
        if let Some(v) = var("GENERATION_TEMPERATURE") {
            config.generation_temperature = parse("GENERATION_TEMPERATURE", &v)?;
        }
        if let Some(v) = var("GENERATION_MAX_TOKENS") {
            config.generation_max_tokens = parse("GENERATION_MAX_TOKENS", &v)?;
        }
        if let Some(v) = var("QDRANT_URL") {
            config.qdrant_url = v;
        }
        if let Some(v) = var("STORAGE_ROOT") {
            config.storage_root = PathBuf::from(v);
        }
        if let Some(v) = var("INGEST_WORKERS") {
            config.ingest_workers = parse("INGEST_WORKERS", &v)?;
        }
        if let Some(v) = var("INGEST_QUEUE_CAPACITY") {
            config.ingest_queue_capacity = parse("INGEST_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = var("FOCUS_DOMAINS") {
            config.default_focus_domains =
                v.split(',').map(str::trim).filter(|d| !d.is_empty()).map(str::to_string).collect();
        }
        if let Some(v) = var("CHUNK_SIZE") {
            config.rag.chunk_size = parse("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = var("CHUNK_OVERLAP") {
            config.rag.chunk_overlap = parse("CHUNK_OVERLAP", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dimensions == 0 {
            return Err(QuestError::Config("embedding_dimensions must be greater than 0".into()));
        }
        if self.ingest_workers == 0 {
            return Err(QuestError::Config("ingest_workers must be greater than 0".into()));
        }
        if self.ingest_queue_capacity == 0 {
            return Err(QuestError::Config("ingest_queue_capacity must be greater than 0".into()));
        }
        if !(0.0..=2.0).contains(&self.generation_temperature) {
            return Err(QuestError::Config(format!(
                "generation_temperature ({}) must be within 0.0..=2.0",
                self.generation_temperature
            )));
        }
        self.rag.validate().map_err(|e| QuestError::Config(e.to_string()))
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| QuestError::Config(format!("{ENV_PREFIX}{name}={value:?}: {e}")))
}
