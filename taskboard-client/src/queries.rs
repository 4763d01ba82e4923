use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use taskboard_core::BoardPayload;

use crate::errors::ClientResult;

/// SQL for the snapshot cache.
pub struct Queries;

impl Queries {
    pub const SCHEMA: &'static str = r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            key TEXT PRIMARY KEY,
            body JSON NOT NULL,
            updated_at TIMESTAMP NOT NULL
        );
    "#;

    pub const GET_SNAPSHOT: &'static str =
        "SELECT key, body, updated_at FROM snapshots WHERE key = ?1";

    pub const UPSERT_SNAPSHOT: &'static str = r#"
        INSERT INTO snapshots (key, body, updated_at) VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET
            body = excluded.body,
            updated_at = excluded.updated_at
    "#;

    pub const DELETE_SNAPSHOT: &'static str = "DELETE FROM snapshots WHERE key = ?1";
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub key: String,
    pub payload: BoardPayload,
    pub updated_at: DateTime<Utc>,
}

pub struct DbHelpers;

impl DbHelpers {
    pub async fn init_schema(pool: &SqlitePool) -> ClientResult<()> {
        sqlx::query(Queries::SCHEMA).execute(pool).await?;
        Ok(())
    }

    pub fn parse_snapshot(row: &SqliteRow) -> ClientResult<SnapshotRow> {
        let key: String = row.try_get("key")?;
        let body: String = row.try_get("body")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(SnapshotRow {
            key,
            payload: serde_json::from_str(&body)?,
            // A malformed timestamp does not invalidate the snapshot itself.
            updated_at: DateTime::parse_from_rfc3339(&updated_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    /// Bind values for `UPSERT_SNAPSHOT`: key, JSON body, timestamp.
    pub fn snapshot_to_params(
        key: &str,
        payload: &BoardPayload,
    ) -> ClientResult<(String, String, String)> {
        Ok((
            key.to_string(),
            serde_json::to_string(payload)?,
            Utc::now().to_rfc3339(),
        ))
    }
}
