//! Query routing over the two search modes.
//!
//! [`RetrievalRouter`] validates the query, fills in configured
//! defaults, and dispatches: keyword search goes straight to the text
//! index; semantic search embeds the query exactly once and asks the
//! store for the top `k` of a candidate pool of at least
//! `max(num_candidates, k)` vectors.

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::error::{Result, StructuredError};
use crate::store::{DocumentStore, SearchResult};

pub struct RetrievalRouter<E, S> {
    embedder: E,
    store: S,
    model: String,
    config: RetrievalConfig,
}

impl<E, S> RetrievalRouter<E, S>
where
    E: Embedder,
    S: DocumentStore,
{
    pub fn new(embedder: E, store: S, model: String, config: RetrievalConfig) -> Self {
        Self {
            embedder,
            store,
            model,
            config,
        }
    }

    /// Keyword search over the inverted index. `limit` defaults to the
    /// configured `max_text_results`.
    pub async fn keyword_search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        validate_query(query)?;
        let limit = match limit {
            Some(0) => return Err(StructuredError::invalid_input("limit must be >= 1")),
            Some(n) => n,
            None => self.config.max_text_results,
        };

        tracing::debug!(query, limit, "keyword search");
        self.store.text_search(query, limit).await
    }

    /// Semantic search: embed the query with the query model, then rank
    /// stored vectors by cosine similarity. `k` defaults to the
    /// configured `default_k`; the candidate pool never drops below `k`.
    pub async fn semantic_search(&self, query: &str, k: Option<usize>) -> Result<Vec<SearchResult>> {
        validate_query(query)?;
        let k = match k {
            Some(0) => return Err(StructuredError::invalid_input("k must be >= 1")),
            Some(n) => n,
            None => self.config.default_k,
        };

        let embedding = self.embedder.embed(&self.model, query).await?;
        let num_candidates = self.config.num_candidates.max(k);

        tracing::debug!(query, k, num_candidates, "semantic search");
        self.store.vector_search(&embedding, k, num_candidates).await
    }
}

fn validate_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(StructuredError::invalid_input("query must not be empty"));
    }
    Ok(())
}
