//! Local snapshot cache used for a fast first render.
//!
//! Cache failures are logged and never fail a board operation.

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use taskboard_core::{BoardError, BoardPayload, BoardResult};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::errors::ClientError;
use crate::queries::{DbHelpers, Queries};

#[async_trait]
pub trait LocalCache: Send + Sync {
    async fn get(&self, key: &str) -> BoardResult<Option<BoardPayload>>;

    async fn set(&self, key: &str, snapshot: &BoardPayload) -> BoardResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, BoardPayload>>,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(key: &str, snapshot: BoardPayload) -> Self {
        let cache = Self::new();
        if let Ok(mut entries) = cache.entries.lock() {
            entries.insert(key.to_string(), snapshot);
        }
        cache
    }

    pub fn snapshot(&self, key: &str) -> Option<BoardPayload> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes every subsequent read and write fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> BoardResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BoardError::Cache("memory cache unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn get(&self, key: &str) -> BoardResult<Option<BoardPayload>> {
        self.check()?;
        let entries = self
            .entries
            .lock()
            .map_err(|_| BoardError::LockError("memory cache".into()))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, snapshot: &BoardPayload) -> BoardResult<()> {
        self.check()?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BoardError::LockError("memory cache".into()))?;
        entries.insert(key.to_string(), snapshot.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Key/value snapshot store in a single SQLite table.
pub struct SqliteCache {
    pub pool: SqlitePool,
}

impl SqliteCache {
    pub async fn new(database_url: &str) -> BoardResult<Self> {
        // One connection: every handle must see the same `sqlite::memory:` database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .map_err(ClientError::from)?;
        DbHelpers::init_schema(&pool).await?;
        debug!("Snapshot cache ready at {}", database_url);
        Ok(Self { pool })
    }

    pub async fn remove(&self, key: &str) -> BoardResult<bool> {
        let result = sqlx::query(Queries::DELETE_SNAPSHOT)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(ClientError::from)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl LocalCache for SqliteCache {
    async fn get(&self, key: &str) -> BoardResult<Option<BoardPayload>> {
        let row = sqlx::query(Queries::GET_SNAPSHOT)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(ClientError::from)?;
        match row {
            Some(row) => Ok(Some(DbHelpers::parse_snapshot(&row)?.payload)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, snapshot: &BoardPayload) -> BoardResult<()> {
        let (key, body, updated_at) = DbHelpers::snapshot_to_params(key, snapshot)?;
        sqlx::query(Queries::UPSERT_SNAPSHOT)
            .bind(key)
            .bind(body)
            .bind(updated_at)
            .execute(&self.pool)
            .await
            .map_err(ClientError::from)?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum CacheCommand {
    Write(BoardPayload),
    Flush(oneshot::Sender<()>),
}

/// Spawns the single task that applies snapshot writes in the order they were queued.
pub fn spawn_cache_writer(
    cache: Arc<dyn LocalCache>,
    key: String,
) -> mpsc::UnboundedSender<CacheCommand> {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(command) = receiver.recv().await {
            match command {
                CacheCommand::Write(snapshot) => {
                    if let Err(e) = cache.set(&key, &snapshot).await {
                        warn!("Failed to cache board snapshot: {}", e);
                    }
                }
                CacheCommand::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("Cache writer stopped");
    });
    sender
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskboard_core::{ListId, ListPayload};

    fn payload(name: &str) -> BoardPayload {
        BoardPayload {
            lists: vec![ListPayload {
                id: ListId(1),
                name: name.into(),
                order_index: 0,
                tasks: vec![],
            }],
        }
    }

    #[tokio::test]
    async fn test_writer_applies_writes_in_order() {
        let cache = Arc::new(MemoryCache::new());
        let writer = spawn_cache_writer(cache.clone(), "columns".into());

        writer.send(CacheCommand::Write(payload("first"))).unwrap();
        writer.send(CacheCommand::Write(payload("second"))).unwrap();
        let (done, flushed) = oneshot::channel();
        writer.send(CacheCommand::Flush(done)).unwrap();
        flushed.await.unwrap();

        assert_eq!(cache.write_count(), 2);
        assert_eq!(cache.snapshot("columns"), Some(payload("second")));
    }

    #[tokio::test]
    async fn test_writer_survives_cache_failures() {
        let cache = Arc::new(MemoryCache::new());
        cache.set_failing(true);
        let writer = spawn_cache_writer(cache.clone(), "columns".into());

        writer.send(CacheCommand::Write(payload("lost"))).unwrap();
        let (done, flushed) = oneshot::channel();
        writer.send(CacheCommand::Flush(done)).unwrap();
        flushed.await.unwrap();

        cache.set_failing(false);
        assert_eq!(cache.snapshot("columns"), None);
    }
}
