//! Document ingestion pipeline.
//!
//! `extract → chunk → embed → upsert`, strictly sequential per chunk.
//! Each chunk gets a fresh UUIDv4, so re-ingesting the same document
//! adds a second copy of every chunk. A failure at any step aborts the
//! run immediately; chunks already written stay in the store (no
//! rollback).

use uuid::Uuid;

use crate::chunker::ChunkEncoder;
use crate::embedding::Embedder;
use crate::error::{ErrorKind, Result, StructuredError};
use crate::extract::{Extractor, PageRange};
use crate::store::{ChunkMetadata, ChunkRecord, DocumentStore};

pub struct IngestionPipeline<X, E, S> {
    extractor: X,
    embedder: E,
    store: S,
    encoder: ChunkEncoder,
    model: String,
}

impl<X, E, S> IngestionPipeline<X, E, S>
where
    X: Extractor,
    E: Embedder,
    S: DocumentStore,
{
    pub fn new(extractor: X, embedder: E, store: S, encoder: ChunkEncoder, model: String) -> Self {
        Self {
            extractor,
            embedder,
            store,
            encoder,
            model,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Ingest one document, returning the number of chunks written.
    ///
    /// `pages` narrows PDF extraction; other formats ignore it. The
    /// range is flattened to one text before chunking, so each stored
    /// chunk records the range start as its `page`. Fails with
    /// `EMPTY_DOCUMENT` when extraction yields only whitespace and
    /// `NO_CHUNKS_GENERATED` when chunking yields nothing.
    pub async fn ingest(&self, source: &str, pages: Option<PageRange>) -> Result<usize> {
        tracing::info!(source, "ingesting document");

        let text = self.extractor.extract(source, pages).await?;
        if text.trim().is_empty() {
            tracing::warn!(source, "document contains no extractable text");
            return Err(StructuredError::new(
                ErrorKind::EmptyDocument,
                format!("no extractable text in {source}"),
            ));
        }

        let chunks = self.encoder.split(&text)?;
        if chunks.is_empty() {
            return Err(StructuredError::new(
                ErrorKind::NoChunksGenerated,
                format!("chunking produced no chunks for {source}"),
            ));
        }

        let total = chunks.len();
        for (index, chunk_text) in chunks.into_iter().enumerate() {
            let embedding = self.embedder.embed(&self.model, &chunk_text).await?;
            let record = ChunkRecord {
                id: Uuid::new_v4().to_string(),
                text: chunk_text,
                embedding,
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    chunk_index: index,
                    page: pages.map(|p| p.start),
                },
            };
            self.store.upsert_chunk(&record).await?;
            tracing::debug!(source, chunk = index + 1, total, "chunk stored");
        }

        tracing::info!(source, chunks = total, "ingestion complete");
        Ok(total)
    }
}
