//! Idempotent schema setup.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the local cache schema at the configured path.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    ensure_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table used by the cache and the document store.
///
/// Safe to call on every startup.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    // Local cache: one JSON value per key
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Remote documents, namespaced by user
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS remote_documents (
            user_id TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            notes_json TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, doc_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_remote_documents_updated_at ON remote_documents(user_id, updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
