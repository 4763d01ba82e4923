mod common;

use common::{sample_board, test_config, with_timeout};
use sqlx::Row;
use std::sync::Arc;
use taskboard_client::testing::MockSyncClient;
use taskboard_client::{BoardStore, LocalCache, SqliteCache};
use taskboard_core::{ListId, TaskId};

#[tokio::test]
async fn test_sqlite_cache_round_trip() {
    let cache = SqliteCache::new("sqlite::memory:").await.unwrap();
    assert_eq!(cache.get("columns").await.unwrap(), None);

    cache.set("columns", &sample_board()).await.unwrap();
    assert_eq!(cache.get("columns").await.unwrap(), Some(sample_board()));
}

#[tokio::test]
async fn test_sqlite_cache_overwrites_by_key() {
    let cache = SqliteCache::new("sqlite::memory:").await.unwrap();
    let mut renamed = sample_board();
    renamed.lists[0].name = "Today".into();

    cache.set("columns", &sample_board()).await.unwrap();
    cache.set("columns", &renamed).await.unwrap();
    cache.set("archive", &sample_board()).await.unwrap();

    let row = sqlx::query("SELECT COUNT(*) AS count FROM snapshots")
        .fetch_one(&cache.pool)
        .await
        .unwrap();
    assert_eq!(row.get::<i64, _>("count"), 2);
    assert_eq!(cache.get("columns").await.unwrap(), Some(renamed));

    assert!(cache.remove("archive").await.unwrap());
    assert!(!cache.remove("archive").await.unwrap());
    assert_eq!(cache.get("archive").await.unwrap(), None);
}

#[tokio::test]
async fn test_corrupt_snapshot_is_an_error_not_a_panic() {
    let cache = SqliteCache::new("sqlite::memory:").await.unwrap();
    sqlx::query("INSERT INTO snapshots (key, body, updated_at) VALUES ('columns', 'not json', 'yesterday')")
        .execute(&cache.pool)
        .await
        .unwrap();

    assert!(cache.get("columns").await.is_err());
}

#[tokio::test]
async fn test_store_writes_through_to_sqlite() {
    let server = Arc::new(MockSyncClient::with_board(sample_board()));
    let cache = Arc::new(SqliteCache::new("sqlite::memory:").await.unwrap());
    let store = BoardStore::new(server, cache.clone(), &test_config());
    store.refresh().await.unwrap();

    let pending = store.toggle_completion(TaskId(20), true).unwrap();
    store.flush_cache().await.unwrap();

    let cached = cache.get("columns").await.unwrap().unwrap().into_board().unwrap();
    assert!(cached.task(TaskId(20)).unwrap().is_completed);
    assert_eq!(cached.list(ListId(1)).unwrap().task_ids, vec![TaskId(10), TaskId(20)]);
    with_timeout(pending.confirmed()).await.unwrap();
}
