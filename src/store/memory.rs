//! In-memory [`DocumentStore`] for tests and examples.
//!
//! Keyword search is case-insensitive term counting; vector search is
//! brute-force cosine similarity over a candidate pool taken in
//! insertion order. No persistence, no retry.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::Result;

use super::{check_candidate_pool, ChunkRecord, DocumentStore, SearchResult};

#[derive(Default)]
pub struct MemoryStore {
    chunks: RwLock<Vec<ChunkRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored chunk count, for assertions.
    pub fn len(&self) -> usize {
        self.chunks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the stored records, in insertion order.
    pub fn records(&self) -> Vec<ChunkRecord> {
        self.chunks.read().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert_chunk(&self, record: &ChunkRecord) -> Result<()> {
        let mut chunks = self.chunks.write().unwrap();
        match chunks.iter_mut().find(|c| c.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => chunks.push(record.clone()),
        }
        Ok(())
    }

    async fn text_search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read().unwrap();
        let mut results: Vec<SearchResult> = chunks
            .iter()
            .filter_map(|chunk| {
                let text_lower = chunk.text.to_lowercase();
                let matches = terms.iter().filter(|t| text_lower.contains(*t)).count();
                if matches == 0 {
                    return None;
                }
                Some(SearchResult {
                    id: chunk.id.clone(),
                    text: chunk.text.clone(),
                    metadata: chunk.metadata.clone(),
                    score: matches as f64,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    async fn vector_search(
        &self,
        query: &[f32],
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<SearchResult>> {
        check_candidate_pool(limit, num_candidates)?;

        let chunks = self.chunks.read().unwrap();
        let mut results: Vec<SearchResult> = chunks
            .iter()
            .take(num_candidates)
            .map(|chunk| SearchResult {
                id: chunk.id.clone(),
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                score: cosine_similarity(query, &chunk.embedding) as f64,
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::ChunkMetadata;

    fn record(id: &str, text: &str, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            text: text.to_string(),
            embedding,
            metadata: ChunkMetadata {
                source: "test.txt".to_string(),
                chunk_index: 0,
                page: None,
            },
        }
    }

    #[tokio::test]
    async fn upsert_replaces_by_id_without_growing() {
        let store = MemoryStore::new();
        store.upsert_chunk(&record("a", "old", vec![1.0])).await.unwrap();
        store.upsert_chunk(&record("a", "new", vec![0.5])).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].text, "new");
    }

    #[tokio::test]
    async fn text_search_ranks_by_matched_terms() {
        let store = MemoryStore::new();
        store
            .upsert_chunk(&record("a", "rust ownership and borrowing", vec![1.0]))
            .await
            .unwrap();
        store
            .upsert_chunk(&record("b", "rust ownership model", vec![1.0]))
            .await
            .unwrap();
        store
            .upsert_chunk(&record("c", "python gc", vec![1.0]))
            .await
            .unwrap();

        let results = store
            .text_search("rust ownership borrowing", 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[0].score, 3.0);
    }

    #[tokio::test]
    async fn vector_search_orders_by_cosine() {
        let store = MemoryStore::new();
        store.upsert_chunk(&record("x", "x", vec![1.0, 0.0])).await.unwrap();
        store.upsert_chunk(&record("y", "y", vec![0.0, 1.0])).await.unwrap();
        store
            .upsert_chunk(&record("d", "diag", vec![0.7, 0.7]))
            .await
            .unwrap();

        let results = store.vector_search(&[1.0, 0.0], 2, 100).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "x");
        assert_eq!(results[1].id, "d");
    }

    #[tokio::test]
    async fn vector_search_rejects_small_candidate_pool() {
        let store = MemoryStore::new();
        let err = store.vector_search(&[1.0], 10, 5).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn candidate_pool_bounds_the_scan() {
        let store = MemoryStore::new();
        store.upsert_chunk(&record("a", "a", vec![0.1, 0.0])).await.unwrap();
        store.upsert_chunk(&record("b", "b", vec![1.0, 0.0])).await.unwrap();

        // Pool of one only considers the first insertion.
        let results = store.vector_search(&[1.0, 0.0], 1, 1).await.unwrap();
        assert_eq!(results[0].id, "a");
    }
}
