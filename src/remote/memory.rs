//! In-process [`DocumentStore`] with push delivery.
//!
//! Each document is held inside its own `watch` channel, so a write is
//! visible to every watcher of that document the moment it lands. The
//! store can be switched offline to simulate transport failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::watch;

use scopenotes_core::error::{SyncError, SyncResult};
use scopenotes_core::models::{Note, RemoteDocument};

use super::{DocumentStore, DocumentWatch};

type DocKey = (String, String);

pub struct MemoryDocumentStore {
    docs: RwLock<HashMap<DocKey, watch::Sender<Option<RemoteDocument>>>>,
    offline: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            offline: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// While offline every operation fails with `RemoteUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful writes since construction.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> SyncResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::RemoteUnavailable(
                "remote store is offline".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn doc_key(user_id: &str, doc_id: &str) -> DocKey {
    (user_id.to_string(), doc_id.to_string())
}

/// Drop channels that were only ever watched and have no watchers left.
fn prune_idle(docs: &mut HashMap<DocKey, watch::Sender<Option<RemoteDocument>>>) {
    docs.retain(|_, tx| tx.borrow().is_some() || tx.receiver_count() > 0);
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(
        &self,
        user_id: &str,
        doc_id: &str,
    ) -> SyncResult<Option<RemoteDocument>> {
        self.ensure_online()?;
        let docs = self.docs.read().unwrap();
        Ok(docs
            .get(&doc_key(user_id, doc_id))
            .and_then(|tx| tx.borrow().clone()))
    }

    async fn set_document(
        &self,
        user_id: &str,
        doc_id: &str,
        notes: &[Note],
    ) -> SyncResult<RemoteDocument> {
        self.ensure_online()?;
        let mut docs = self.docs.write().unwrap();
        let tx = docs
            .entry(doc_key(user_id, doc_id))
            .or_insert_with(|| watch::channel(None).0);

        // updated_at is strictly increasing per document
        let previous = tx.borrow().as_ref().map(|d| d.updated_at).unwrap_or(0);
        let doc = RemoteDocument {
            notes: notes.to_vec(),
            updated_at: chrono::Utc::now().timestamp_millis().max(previous + 1),
        };
        tx.send_replace(Some(doc.clone()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(doc)
    }

    async fn watch_document(&self, user_id: &str, doc_id: &str) -> SyncResult<DocumentWatch> {
        self.ensure_online()?;
        let mut docs = self.docs.write().unwrap();
        prune_idle(&mut docs);
        let tx = docs
            .entry(doc_key(user_id, doc_id))
            .or_insert_with(|| watch::channel(None).0);
        Ok(tx.subscribe())
    }
}
