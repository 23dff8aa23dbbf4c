//! SQLite-backed [`CacheStore`] implementation.
//!
//! Each cache entry is one row in `cache_entries`, with the value stored
//! as JSON text.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use scopenotes_core::error::{SyncError, SyncResult};
use scopenotes_core::store::CacheStore;

/// Persistent local cache over a [`SqlitePool`].
pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    /// Wrap a pool whose schema was created by
    /// [`ensure_schema`](crate::migrate::ensure_schema).
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn cache_err(e: sqlx::Error) -> SyncError {
    SyncError::Cache(e.to_string())
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, key: &str) -> SyncResult<Option<Value>> {
        let row = sqlx::query("SELECT value FROM cache_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(cache_err)?;

        match row {
            Some(row) => {
                let raw: String = row.get("value");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> SyncResult<()> {
        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(serde_json::to_string(&value)?)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(cache_err)?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> SyncResult<Vec<String>> {
        // '_' and '%' in keys must match literally, so no LIKE
        let rows = sqlx::query(
            "SELECT key FROM cache_entries WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key ASC",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(cache_err)?;

        Ok(rows.iter().map(|row| row.get("key")).collect())
    }
}
