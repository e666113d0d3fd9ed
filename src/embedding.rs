//! Embedding provider abstraction and the OpenAI-backed implementation.
//!
//! [`Embedder`] is the seam the ingestion pipeline and the retrieval
//! router depend on; [`OpenAiEmbedder`] calls `POST /v1/embeddings` with
//! a per-request timeout and the shared retry envelope.
//!
//! Retry classification:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Malformed or empty response bodies → retry
//! - Vector length differing from the configured dims → fail immediately
//!
//! Also provides the vector utilities shared with the store layer:
//! [`cosine_similarity`], [`vec_to_blob`], [`blob_to_vec`].

use async_trait::async_trait;

use crate::config::{EmbeddingConfig, RetryConfig};
use crate::error::{Result, StructuredError};
use crate::retry::{retry_async, RetryPolicy};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Trait for embedding backends.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text with the named model, returning a vector of the
    /// backend's dimensionality.
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>>;

    /// Vector dimensionality every returned embedding has.
    fn dims(&self) -> usize;
}

/// Embedding client for the OpenAI embeddings API.
///
/// Requires the `OPENAI_API_KEY` environment variable. Each call embeds
/// a single text; transient failures are retried with exponential
/// backoff (base 1s, capped at half the request timeout) up to the
/// configured attempt count, then surface as `API_ERROR`.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    dims: usize,
    policy: RetryPolicy,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, retry: &RetryConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            StructuredError::api("OPENAI_API_KEY environment variable not set")
        })?;

        let client = reqwest::Client::builder()
            .timeout(retry.timeout())
            .build()
            .map_err(|e| {
                StructuredError::api("failed to build HTTP client").with_details(e.to_string())
            })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            dims: config.dims,
            policy: retry.policy(),
        })
    }

    async fn request_once(&self, model: &str, text: &str) -> std::result::Result<Vec<f32>, EmbedError> {
        let body = serde_json::json!({
            "model": model,
            "input": [text],
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(EmbedError::Transient(format!(
                    "embedding API error {status}: {body_text}"
                )));
            }
            return Err(EmbedError::Fatal(
                StructuredError::api(format!("embedding API rejected request ({status})"))
                    .with_details(body_text),
            ));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EmbedError::Transient(format!("unreadable response body: {e}")))?;

        let vector = parse_embedding_response(&json)
            .ok_or_else(|| EmbedError::Transient("malformed embedding response".to_string()))?;

        if vector.len() != self.dims {
            return Err(EmbedError::Fatal(StructuredError::api(format!(
                "model {model} returned a {}-dimension vector, expected {}",
                vector.len(),
                self.dims
            ))));
        }

        Ok(vector)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        retry_async(
            &self.policy,
            |err: &EmbedError| matches!(err, EmbedError::Transient(_)),
            || self.request_once(model, text),
        )
        .await
        .map_err(|err| match err {
            EmbedError::Fatal(e) => e,
            EmbedError::Transient(detail) => StructuredError::api(format!(
                "embedding failed after {} attempts",
                self.policy.max_attempts
            ))
            .with_details(detail),
        })
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Embedder used when no provider is configured. Every call fails,
/// which keeps keyword-only setups working without an API key.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f32>> {
        Err(StructuredError::api("embedding provider is disabled"))
    }

    fn dims(&self) -> usize {
        0
    }
}

/// Internal split between faults worth retrying and final answers.
enum EmbedError {
    Transient(String),
    Fatal(StructuredError),
}

impl std::fmt::Display for EmbedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedError::Transient(detail) => write!(f, "{detail}"),
            EmbedError::Fatal(err) => write!(f, "{err}"),
        }
    }
}

/// Extract `data[0].embedding` from an embeddings API response.
fn parse_embedding_response(json: &serde_json::Value) -> Option<Vec<f32>> {
    let embedding = json
        .get("data")?
        .as_array()?
        .first()?
        .get("embedding")?
        .as_array()?;

    let mut vector = Vec::with_capacity(embedding.len());
    for value in embedding {
        vector.push(value.as_f64()? as f32);
    }
    Some(vector)
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty vectors
/// or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), vec.len() * 4);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn cosine_identical_and_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs_are_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn parses_first_embedding_from_data_array() {
        let json = serde_json::json!({
            "data": [{"embedding": [0.25, -0.5], "index": 0}],
            "model": "text-embedding-3-large",
        });
        assert_eq!(parse_embedding_response(&json), Some(vec![0.25, -0.5]));
    }

    #[test]
    fn rejects_malformed_response_shapes() {
        assert!(parse_embedding_response(&serde_json::json!({})).is_none());
        assert!(parse_embedding_response(&serde_json::json!({"data": []})).is_none());
        assert!(parse_embedding_response(&serde_json::json!({"data": [{"embedding": "oops"}]}))
            .is_none());
    }
}
