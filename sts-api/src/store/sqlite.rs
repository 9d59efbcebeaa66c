//! SQLite task backend
//!
//! One row per task: the full record as JSON plus its expiry in epoch
//! milliseconds. A single UPDATE replaces the record, so readers see either
//! the old or the new version.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::debug;

use super::{StoreError, TaskBackend};
use crate::models::Task;

pub struct SqliteTaskBackend {
    pool: SqlitePool,
}

impl SqliteTaskBackend {
    /// Connect and create the `tasks` table if needed
    ///
    /// `sqlite::memory:` is pinned to one connection, since every SQLite
    /// connection would otherwise get its own empty in-memory database.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        debug!(url = %url, max_connections, "Connecting task store");
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let backend = Self { pool };
        backend.init_tables().await?;
        Ok(backend)
    }

    async fn init_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_expires_at ON tasks(expires_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl TaskBackend for SqliteTaskBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn insert(&self, task: &Task) -> Result<(), StoreError> {
        let record = serde_json::to_string(task)?;
        sqlx::query("INSERT INTO tasks (task_id, record, expires_at) VALUES (?, ?, ?)")
            .bind(&task.task_id)
            .bind(record)
            .bind(task.expires_at.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load(&self, task_id: &str, now: DateTime<Utc>) -> Result<Option<Task>, StoreError> {
        let record: Option<String> =
            sqlx::query_scalar("SELECT record FROM tasks WHERE task_id = ? AND expires_at > ?")
                .bind(task_id)
                .bind(now.timestamp_millis())
                .fetch_optional(&self.pool)
                .await?;

        match record {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn replace(&self, task: &Task) -> Result<(), StoreError> {
        let record = serde_json::to_string(task)?;
        let result = sqlx::query("UPDATE tasks SET record = ?, expires_at = ? WHERE task_id = ?")
            .bind(record)
            .bind(task.expires_at.timestamp_millis())
            .bind(&task.task_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(task.task_id.clone()));
        }
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        let purged: Vec<String> =
            sqlx::query_scalar("DELETE FROM tasks WHERE expires_at <= ? RETURNING task_id")
                .bind(now.timestamp_millis())
                .fetch_all(&self.pool)
                .await?;
        Ok(purged)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
