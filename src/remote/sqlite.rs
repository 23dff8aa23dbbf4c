//! SQLite-backed [`DocumentStore`]: the durable store behind `notes serve`.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use scopenotes_core::error::{SyncError, SyncResult};
use scopenotes_core::models::{Note, RemoteDocument};

use super::{spawn_poller, DocumentStore, DocumentWatch};

#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    poll_interval: Duration,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
        }
    }
}

fn remote_err(e: sqlx::Error) -> SyncError {
    SyncError::RemoteUnavailable(e.to_string())
}

async fn fetch(pool: &SqlitePool, user_id: &str, doc_id: &str) -> SyncResult<Option<RemoteDocument>> {
    let row = sqlx::query(
        "SELECT notes_json, updated_at FROM remote_documents WHERE user_id = ? AND doc_id = ?",
    )
    .bind(user_id)
    .bind(doc_id)
    .fetch_optional(pool)
    .await
    .map_err(remote_err)?;

    let Some(row) = row else {
        return Ok(None);
    };
    let notes_json: String = row.get("notes_json");
    let notes: Vec<Note> = serde_json::from_str(&notes_json)
        .map_err(|e| SyncError::RemoteUnavailable(format!("corrupt document {}: {}", doc_id, e)))?;
    Ok(Some(RemoteDocument {
        notes,
        updated_at: row.get("updated_at"),
    }))
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get_document(
        &self,
        user_id: &str,
        doc_id: &str,
    ) -> SyncResult<Option<RemoteDocument>> {
        fetch(&self.pool, user_id, doc_id).await
    }

    async fn set_document(
        &self,
        user_id: &str,
        doc_id: &str,
        notes: &[Note],
    ) -> SyncResult<RemoteDocument> {
        let notes_json = serde_json::to_string(notes)
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;
        let now = chrono::Utc::now().timestamp_millis();

        // updated_at is strictly increasing per document
        let updated_at: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO remote_documents (user_id, doc_id, notes_json, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, doc_id) DO UPDATE SET
                notes_json = excluded.notes_json,
                updated_at = MAX(excluded.updated_at, remote_documents.updated_at + 1)
            RETURNING updated_at
            "#,
        )
        .bind(user_id)
        .bind(doc_id)
        .bind(&notes_json)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(remote_err)?;

        Ok(RemoteDocument {
            notes: notes.to_vec(),
            updated_at,
        })
    }

    async fn watch_document(&self, user_id: &str, doc_id: &str) -> SyncResult<DocumentWatch> {
        let pool = self.pool.clone();
        let user_id = user_id.to_string();
        let doc_id = doc_id.to_string();
        spawn_poller(self.poll_interval, move || {
            let pool = pool.clone();
            let user_id = user_id.clone();
            let doc_id = doc_id.clone();
            async move { fetch(&pool, &user_id, &doc_id).await }
        })
        .await
    }
}
