//! Remote document store abstraction.
//!
//! The remote store is a per-user namespaced collection of documents, one
//! per scope-context, keyed by the remote key dialect. Backends:
//!
//! | Backend | Module | Change delivery |
//! |---------|--------|-----------------|
//! | In-process | [`memory`] | push, on every write |
//! | HTTP | [`http`] | polling |
//! | SQLite | [`sqlite`] | polling (used by `notes serve`) |
//!
//! Every backend reports transport problems as
//! [`SyncError::RemoteUnavailable`].

pub mod http;
pub mod memory;
pub mod sqlite;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use scopenotes_core::error::SyncResult;
use scopenotes_core::models::{Note, RemoteDocument};

use crate::config::Config;

/// Live view of one remote document. `None` while the document does not
/// exist. Dropping every receiver stops the backend's delivery task.
pub type DocumentWatch = watch::Receiver<Option<RemoteDocument>>;

/// Abstract remote document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read. `Ok(None)` when the document does not exist.
    async fn get_document(&self, user_id: &str, doc_id: &str)
        -> SyncResult<Option<RemoteDocument>>;

    /// Overwrite a document. The store assigns `updated_at`.
    async fn set_document(
        &self,
        user_id: &str,
        doc_id: &str,
        notes: &[Note],
    ) -> SyncResult<RemoteDocument>;

    /// Watch a document. The receiver starts at the document's current
    /// state and changes on every subsequent write.
    async fn watch_document(&self, user_id: &str, doc_id: &str) -> SyncResult<DocumentWatch>;
}

/// Build the backend selected by `[remote].provider`, or `None` when remote
/// sync is disabled.
pub fn build_document_store(config: &Config) -> Result<Option<Arc<dyn DocumentStore>>> {
    match config.remote.provider.as_str() {
        "disabled" => Ok(None),
        "memory" => Ok(Some(Arc::new(memory::MemoryDocumentStore::new()))),
        "http" => Ok(Some(Arc::new(http::HttpDocumentStore::new(&config.remote)?))),
        other => anyhow::bail!("Unknown remote provider: '{}'", other),
    }
}

/// Watch a document by re-reading it every `interval`.
///
/// The first read happens before returning so the receiver starts at the
/// real current state. The poller exits once every receiver is dropped.
/// Failed polls are logged and retried on the next tick.
pub(crate) async fn spawn_poller<F, Fut>(interval: Duration, fetch: F) -> SyncResult<DocumentWatch>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SyncResult<Option<RemoteDocument>>> + Send + 'static,
{
    let initial = fetch().await?;
    let (tx, rx) = watch::channel(initial);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            match fetch().await {
                Ok(doc) => {
                    tx.send_if_modified(|current| {
                        if *current == doc {
                            false
                        } else {
                            *current = doc;
                            true
                        }
                    });
                }
                Err(e) => tracing::debug!(error = %e, "document poll failed"),
            }
        }
        tracing::trace!("document poller stopped");
    });

    Ok(rx)
}
