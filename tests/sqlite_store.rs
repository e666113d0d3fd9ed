//! SQLite store behaviors against a real temporary database.

use std::time::Duration;

use sqlx::ConnectOptions;

use docshelf::error::ErrorKind;
use docshelf::retry::RetryPolicy;
use docshelf::store::{ChunkMetadata, ChunkRecord, DocumentStore, SqliteStore};

async fn open_store(dir: &tempfile::TempDir) -> SqliteStore {
    let path = dir.path().join("shelf.sqlite");
    let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40));
    SqliteStore::connect(&path, policy).await.unwrap()
}

fn record(id: &str, text: &str, embedding: Vec<f32>, index: usize) -> ChunkRecord {
    ChunkRecord {
        id: id.to_string(),
        text: text.to_string(),
        embedding,
        metadata: ChunkMetadata {
            source: "docs/guide.md".to_string(),
            chunk_index: index,
            page: None,
        },
    }
}

async fn row_count(store: &SqliteStore) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(store.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn upsert_with_existing_id_replaces_without_growing() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    store
        .upsert_chunk(&record("c1", "original text about caching", vec![1.0, 0.0], 0))
        .await
        .unwrap();
    store
        .upsert_chunk(&record("c1", "replacement text about sharding", vec![0.0, 1.0], 0))
        .await
        .unwrap();

    assert_eq!(row_count(&store).await, 1);

    // The FTS index reflects the replacement.
    let hits = store.text_search("sharding", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "c1");
    let stale = store.text_search("caching", 10).await.unwrap();
    assert!(stale.is_empty());
}

#[tokio::test]
async fn text_search_ranks_and_respects_limit() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    store
        .upsert_chunk(&record("a", "retry backoff policy for the embedding client", vec![1.0], 0))
        .await
        .unwrap();
    store
        .upsert_chunk(&record("b", "backoff is exponential with a ceiling", vec![1.0], 1))
        .await
        .unwrap();
    store
        .upsert_chunk(&record("c", "unrelated chapter on keyboard layouts", vec![1.0], 2))
        .await
        .unwrap();

    let hits = store.text_search("backoff", 10).await.unwrap();
    assert_eq!(hits.len(), 2);
    for hit in &hits {
        assert!(hit.text.contains("backoff"));
        assert_eq!(hit.metadata.source, "docs/guide.md");
    }

    let hits = store.text_search("backoff", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn text_search_phrase_match() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    store
        .upsert_chunk(&record("a", "the incident commander pages the on call engineer", vec![1.0], 0))
        .await
        .unwrap();
    store
        .upsert_chunk(&record("b", "engineer call logs are on the incident page", vec![1.0], 1))
        .await
        .unwrap();

    let hits = store.text_search("\"incident commander\"", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "a");
}

#[tokio::test]
async fn vector_search_orders_by_cosine_similarity() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    store.upsert_chunk(&record("x", "x axis", vec![1.0, 0.0], 0)).await.unwrap();
    store.upsert_chunk(&record("y", "y axis", vec![0.0, 1.0], 1)).await.unwrap();
    store.upsert_chunk(&record("d", "diagonal", vec![0.7, 0.7], 2)).await.unwrap();

    let hits = store.vector_search(&[1.0, 0.0], 2, 100).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "x");
    assert_eq!(hits[1].id, "d");
    assert!(hits[0].score > hits[1].score);
}

#[tokio::test]
async fn vector_search_rejects_pool_smaller_than_limit() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let err = store.vector_search(&[1.0], 10, 5).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidInput);
}

#[tokio::test]
async fn results_round_trip_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let mut rec = record("p", "page scoped chunk", vec![0.5, 0.5], 4);
    rec.metadata.page = Some(7);
    store.upsert_chunk(&rec).await.unwrap();

    let hits = store.vector_search(&[0.5, 0.5], 1, 100).await.unwrap();
    assert_eq!(hits[0].metadata.chunk_index, 4);
    assert_eq!(hits[0].metadata.page, Some(7));
}

#[tokio::test]
async fn write_lock_outage_past_the_retry_budget_is_database_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shelf.sqlite");
    let policy = RetryPolicy::new(3, Duration::from_millis(50), Duration::from_millis(100));
    let store = SqliteStore::connect(&path, policy).await.unwrap();

    // A second connection holds the write lock for the whole test, so
    // every attempt times out as locked.
    let mut blocker = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(&path)
        .connect()
        .await
        .unwrap();
    sqlx::query("BEGIN EXCLUSIVE")
        .execute(&mut blocker)
        .await
        .unwrap();

    let err = store
        .upsert_chunk(&record("blocked", "never lands", vec![1.0], 0))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::DatabaseError);
    assert!(err.details.is_some());

    sqlx::query("COMMIT").execute(&mut blocker).await.unwrap();
    assert_eq!(row_count(&store).await, 0);
}

#[tokio::test]
async fn write_lock_released_during_backoff_lets_a_retry_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shelf.sqlite");
    let policy = RetryPolicy::new(3, Duration::from_millis(50), Duration::from_millis(100));
    let store = SqliteStore::connect(&path, policy).await.unwrap();

    let mut blocker = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(&path)
        .connect()
        .await
        .unwrap();
    sqlx::query("BEGIN EXCLUSIVE")
        .execute(&mut blocker)
        .await
        .unwrap();

    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        sqlx::query("COMMIT").execute(&mut blocker).await.unwrap();
    });

    store
        .upsert_chunk(&record("landed", "written on retry", vec![1.0], 0))
        .await
        .unwrap();
    release.await.unwrap();

    let hits = store.text_search("retry", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "landed");
}

#[tokio::test]
async fn init_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shelf.sqlite");
    let policy = RetryPolicy::new(1, Duration::from_millis(10), Duration::from_millis(10));

    let first = SqliteStore::connect(&path, policy).await.unwrap();
    first
        .upsert_chunk(&record("keep", "survives reopen", vec![1.0], 0))
        .await
        .unwrap();
    drop(first);

    let second = SqliteStore::connect(&path, policy).await.unwrap();
    let hits = second.text_search("survives", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
}
