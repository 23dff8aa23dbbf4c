//! SQLite connection management.
//!
//! Both the local cache and the reference server's document store live in
//! SQLite files. The file and its parent directories are created
//! automatically, and WAL mode is enabled so a `watch` poller can read while
//! a save is writing.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::config::Config;

/// Connect to the configured local cache database.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    connect_path(&config.cache.path).await
}

/// Connect to a SQLite database at `db_path`, creating it if missing.
pub async fn connect_path(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
