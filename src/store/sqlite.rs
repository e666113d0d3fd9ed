//! SQLite-backed [`DocumentStore`].
//!
//! Schema: a `chunks` table (embedding stored as a little-endian f32
//! BLOB, metadata as JSON) plus a `chunks_fts` FTS5 virtual table for
//! keyword search. Keyword results are ordered by FTS5 `rank` (score is
//! the negated rank, so higher is better). Vector search reads a
//! candidate pool of up to `num_candidates` rows and ranks them by
//! cosine similarity in process.
//!
//! Every operation is retried under the shared policy when the fault is
//! transient (I/O, pool exhaustion, `database is locked`/`busy`); other
//! failures surface immediately as `DATABASE_ERROR`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Result, StructuredError};
use crate::retry::{retry_async, RetryPolicy};

use super::{check_candidate_pool, ChunkMetadata, ChunkRecord, DocumentStore, SearchResult};

pub struct SqliteStore {
    pool: SqlitePool,
    policy: RetryPolicy,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` in WAL mode and
    /// apply the schema.
    pub async fn connect(path: &Path, policy: RetryPolicy) -> Result<Self> {
        // Short busy wait: lock contention surfaces as a transient
        // error and goes through the retry policy.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(250));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                StructuredError::database(format!("failed to open database at {}", path.display()))
                    .with_details(e.to_string())
            })?;

        migrate(&pool).await.map_err(|e| {
            StructuredError::database("failed to apply database schema")
                .with_details(e.to_string())
        })?;

        Ok(Self { pool, policy })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn upsert_once(&self, record: &ChunkRecord) -> sqlx::Result<()> {
        let blob = vec_to_blob(&record.embedding);
        let metadata_json = serde_json::to_string(&record.metadata)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO chunks (id, text, embedding, metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                embedding = excluded.embedding,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&record.id)
        .bind(&record.text)
        .bind(&blob)
        .bind(&metadata_json)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?")
            .bind(&record.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO chunks_fts (chunk_id, text) VALUES (?, ?)")
            .bind(&record.id)
            .bind(&record.text)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn text_search_once(&self, query: &str, limit: usize) -> sqlx::Result<Vec<SearchResult>> {
        let rows = sqlx::query(
            r#"
            SELECT f.chunk_id, f.rank, c.text, c.metadata_json
            FROM chunks_fts f
            JOIN chunks c ON c.id = f.chunk_id
            WHERE chunks_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                Ok(SearchResult {
                    id: row.get("chunk_id"),
                    text: row.get("text"),
                    metadata: parse_metadata(row.get("metadata_json"))?,
                    // FTS5 rank is negative for better matches.
                    score: -rank,
                })
            })
            .collect()
    }

    async fn vector_search_once(
        &self,
        query: &[f32],
        limit: usize,
        num_candidates: usize,
    ) -> sqlx::Result<Vec<SearchResult>> {
        let rows = sqlx::query(
            "SELECT id, text, embedding, metadata_json FROM chunks LIMIT ?",
        )
        .bind(num_candidates as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let stored = blob_to_vec(&blob);
            results.push(SearchResult {
                id: row.get("id"),
                text: row.get("text"),
                metadata: parse_metadata(row.get("metadata_json"))?,
                score: cosine_similarity(query, &stored) as f64,
            });
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn upsert_chunk(&self, record: &ChunkRecord) -> Result<()> {
        retry_async(&self.policy, is_transient, || self.upsert_once(record))
            .await
            .map_err(|e| {
                StructuredError::database(format!("failed to upsert chunk {}", record.id))
                    .with_details(e.to_string())
            })
    }

    async fn text_search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        retry_async(&self.policy, is_transient, || {
            self.text_search_once(query, limit)
        })
        .await
        .map_err(|e| {
            StructuredError::database("keyword search failed").with_details(e.to_string())
        })
    }

    async fn vector_search(
        &self,
        query: &[f32],
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<SearchResult>> {
        check_candidate_pool(limit, num_candidates)?;

        retry_async(&self.policy, is_transient, || {
            self.vector_search_once(query, limit, num_candidates)
        })
        .await
        .map_err(|e| {
            StructuredError::database("vector search failed").with_details(e.to_string())
        })
    }
}

/// Faults worth retrying: connection-level I/O, pool exhaustion, and
/// SQLite lock contention. Constraint violations and SQL errors are not.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            let message = db.message().to_lowercase();
            message.contains("locked") || message.contains("busy")
        }
        _ => false,
    }
}

fn parse_metadata(json: String) -> sqlx::Result<ChunkMetadata> {
    serde_json::from_str(&json).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

async fn migrate(pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(chunk_id UNINDEXED, text)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_and_pool_timeout_faults_are_transient() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ));
        assert!(is_transient(&io));
        assert!(is_transient(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn logic_faults_are_not_transient() {
        assert!(!is_transient(&sqlx::Error::RowNotFound));
        assert!(!is_transient(&sqlx::Error::PoolClosed));
        assert!(!is_transient(&sqlx::Error::Protocol(
            "malformed statement".to_string()
        )));
    }
}
