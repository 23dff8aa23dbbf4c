//! Local cache store abstraction.
//!
//! The [`CacheStore`] trait is a dumb async key→JSON map: no validation,
//! no throttling. It is the offline source of truth and the write-back
//! cache behind the sync orchestrator, and is never used by the
//! presentation layer directly.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SyncResult;
use crate::models::Note;

/// Abstract persistent key-value cache.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](CacheStore::get) | Read a raw value |
/// | [`set`](CacheStore::set) | Overwrite a raw value |
/// | [`keys_with_prefix`](CacheStore::keys_with_prefix) | Enumerate keys (legacy migration scan) |
/// | [`get_notes`](CacheStore::get_notes) | Read a note collection, `[]` when absent |
/// | [`set_notes`](CacheStore::set_notes) | Overwrite a note collection |
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> SyncResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> SyncResult<()>;

    /// All keys starting with `prefix`, in ascending order.
    async fn keys_with_prefix(&self, prefix: &str) -> SyncResult<Vec<String>>;

    /// Read a note collection. Missing or malformed values decode as empty.
    async fn get_notes(&self, key: &str) -> SyncResult<Vec<Note>> {
        Ok(match self.get(key).await? {
            Some(value) => decode_notes(key, value),
            None => Vec::new(),
        })
    }

    async fn set_notes(&self, key: &str, notes: &[Note]) -> SyncResult<()> {
        self.set(key, serde_json::to_value(notes)?).await
    }

    async fn get_flag(&self, key: &str) -> SyncResult<bool> {
        Ok(matches!(self.get(key).await?, Some(Value::Bool(true))))
    }

    async fn set_flag(&self, key: &str, value: bool) -> SyncResult<()> {
        self.set(key, Value::Bool(value)).await
    }
}

fn decode_notes(key: &str, value: Value) -> Vec<Note> {
    match serde_json::from_value(value) {
        Ok(notes) => notes,
        Err(e) => {
            tracing::warn!(key, error = %e, "ignoring malformed cached notes");
            Vec::new()
        }
    }
}
