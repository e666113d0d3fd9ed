use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, StructuredError};
use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in tokens.
    #[serde(default = "default_chunk_size")]
    pub chunk_size_tokens: usize,
    /// Fraction of the window shared with the previous chunk, in `[0, 1)`.
    #[serde(default = "default_overlap_fraction")]
    pub overlap_fraction: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: default_chunk_size(),
            overlap_fraction: default_overlap_fraction(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_overlap_fraction() -> f64 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Model used when embedding document chunks.
    #[serde(default = "default_model")]
    pub model_ingest: String,
    /// Model used when embedding search queries.
    #[serde(default = "default_model")]
    pub model_query: String,
    /// Vector dimensionality both models must produce.
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Override of the provider endpoint; defaults to the OpenAI API.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_ingest: default_model(),
            model_query: default_model(),
            dims: default_dims(),
            base_url: None,
        }
    }
}

fn default_model() -> String {
    "text-embedding-3-large".to_string()
}
fn default_dims() -> usize {
    3072
}

/// Retry bounds shared by the embedding client, the document store, and
/// object-storage fetches. The timeout is also the per-request HTTP
/// timeout; backoff is capped at half of it.
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Per-request timeout for outbound calls, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Total attempts (first call included) before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::from_timeout(self.timeout(), self.max_attempts)
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default cap for keyword search results.
    #[serde(default = "default_max_text_results")]
    pub max_text_results: usize,
    /// Default `k` for semantic search.
    #[serde(default = "default_k")]
    pub default_k: usize,
    /// Candidate pool the vector index scans before ranking.
    #[serde(default = "default_num_candidates")]
    pub num_candidates: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_text_results: default_max_text_results(),
            default_k: default_k(),
            num_candidates: default_num_candidates(),
        }
    }
}

fn default_max_text_results() -> usize {
    5
}
fn default_k() -> usize {
    5
}
fn default_num_candidates() -> usize {
    100
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        StructuredError::invalid_input(format!("Failed to read config file: {}", path.display()))
            .with_details(e.to_string())
    })?;

    let config: Config = toml::from_str(&content).map_err(|e| {
        StructuredError::invalid_input("Failed to parse config file").with_details(e.to_string())
    })?;

    validate(&config)?;
    Ok(config)
}

/// Reject settings that would make the pipeline misbehave at runtime:
/// a non-terminating chunk window, a zero-dimension vector, or a vector
/// candidate pool smaller than the default result count.
pub fn validate(config: &Config) -> Result<()> {
    let chunking = &config.chunking;
    if chunking.chunk_size_tokens == 0 {
        return Err(StructuredError::invalid_input(
            "chunking.chunk_size_tokens must be > 0",
        ));
    }
    if !(0.0..1.0).contains(&chunking.overlap_fraction) {
        return Err(StructuredError::invalid_input(
            "chunking.overlap_fraction must be in [0.0, 1.0)",
        ));
    }

    if config.embedding.dims == 0 {
        return Err(StructuredError::invalid_input("embedding.dims must be > 0"));
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        return Err(StructuredError::invalid_input(
            "retry.max_attempts must be >= 1",
        ));
    }
    if retry.timeout_secs == 0 {
        return Err(StructuredError::invalid_input(
            "retry.timeout_secs must be >= 1",
        ));
    }

    let retrieval = &config.retrieval;
    if retrieval.default_k == 0 || retrieval.max_text_results == 0 {
        return Err(StructuredError::invalid_input(
            "retrieval.default_k and retrieval.max_text_results must be >= 1",
        ));
    }
    if retrieval.num_candidates < retrieval.default_k {
        return Err(StructuredError::invalid_input(
            "retrieval.num_candidates must be >= retrieval.default_k",
        ));
    }

    Ok(())
}
