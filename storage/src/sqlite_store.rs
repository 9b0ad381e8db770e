//! SQLite-backed key-value persistence.
//!
//! One `kv_records` table keyed by (namespace, key), with `updated_at`
//! indexed for the retention sweep. Records are stored as JSON text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::kv_store::KvStore;
use crate::sqlite_pool::SqlitePoolManager;

#[derive(Clone)]
pub struct SqliteKvStore {
    pool_manager: SqlitePoolManager,
}

impl SqliteKvStore {
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool_manager = SqlitePoolManager::new(database_url).await?;
        let store = Self { pool_manager };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), StorageError> {
        info!("Creating kv_records table if not exists");
        let pool = self.pool_manager.pool();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_records (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                record TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_kv_records_updated_at
                ON kv_records(namespace, updated_at)
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn save(&self, namespace: &str, key: &str, record: &Value) -> Result<(), StorageError> {
        let pool = self.pool_manager.pool();
        let body = serde_json::to_string(record)?;

        sqlx::query(
            r#"
            INSERT INTO kv_records (namespace, key, record, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (namespace, key) DO UPDATE SET
                record = excluded.record,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(namespace)
        .bind(key)
        .bind(&body)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        debug!(namespace = %namespace, key = %key, "Record saved");
        Ok(())
    }

    async fn load(&self, namespace: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let pool = self.pool_manager.pool();

        let row: Option<(String,)> = sqlx::query_as(
            "SELECT record FROM kv_records WHERE namespace = ? AND key = ?",
        )
        .bind(namespace)
        .bind(key)
        .fetch_optional(pool)
        .await?;

        match row {
            Some((body,)) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        let pool = self.pool_manager.pool();

        let result = sqlx::query("DELETE FROM kv_records WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn sweep_older_than(
        &self,
        namespace: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let pool = self.pool_manager.pool();

        let result =
            sqlx::query("DELETE FROM kv_records WHERE namespace = ? AND updated_at < ?")
                .bind(namespace)
                .bind(cutoff)
                .execute(pool)
                .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!(namespace = %namespace, removed, "Swept stale records");
        }
        Ok(removed)
    }
}
