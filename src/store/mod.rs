//! Chunk persistence and search.
//!
//! [`DocumentStore`] is the seam between the pipeline/router and the
//! backing index. Two implementations:
//! - [`SqliteStore`] — SQLite with an FTS5 inverted index for keyword
//!   search and embedding BLOBs scanned for cosine similarity.
//! - [`MemoryStore`] — in-process store for tests and examples.
//!
//! Search results are a projection: id, text, metadata, score. Stored
//! embeddings never appear in results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StructuredError};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Provenance attached to every stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Originating document path or URI.
    pub source: String,
    /// Zero-based position of the chunk within its document.
    pub chunk_index: usize,
    /// First page of the extracted range, when ingestion was
    /// page-scoped. Extraction flattens the range to one text before
    /// chunking, so every chunk of the document carries the same value.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub page: Option<usize>,
}

/// A chunk as written to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// One ranked hit. Carries the chunk text and metadata but never the
/// stored embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Backend-relative relevance; higher is better. Keyword and vector
    /// scores are not comparable to each other.
    pub score: f64,
}

/// Persistence seam for chunk storage and the two search modes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert the record, replacing any existing chunk with the same id.
    async fn upsert_chunk(&self, record: &ChunkRecord) -> Result<()>;

    /// Keyword search over the inverted text index, best-ranked first,
    /// at most `limit` results.
    async fn text_search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;

    /// Nearest-neighbor search: score a candidate pool of up to
    /// `num_candidates` stored vectors against `query`, return the top
    /// `limit` by cosine similarity. `num_candidates` must be >= `limit`.
    async fn vector_search(
        &self,
        query: &[f32],
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<SearchResult>>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<T> {
    async fn upsert_chunk(&self, record: &ChunkRecord) -> Result<()> {
        (**self).upsert_chunk(record).await
    }

    async fn text_search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        (**self).text_search(query, limit).await
    }

    async fn vector_search(
        &self,
        query: &[f32],
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<SearchResult>> {
        (**self).vector_search(query, limit, num_candidates).await
    }
}

/// Guard shared by every `vector_search` implementation.
pub(crate) fn check_candidate_pool(limit: usize, num_candidates: usize) -> Result<()> {
    if num_candidates < limit {
        return Err(StructuredError::invalid_input(format!(
            "num_candidates ({num_candidates}) must be >= limit ({limit})"
        )));
    }
    Ok(())
}
