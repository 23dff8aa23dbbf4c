//! Per-user remote sync client.
//!
//! A [`RemoteSyncClient`] is bound to one authenticated user id at
//! construction; every document it touches lives under that user's
//! namespace. Live writes go through **validate → throttle-check → write**:
//!
//! 1. [`SyncLimits::validate`] rejects over-count or oversized collections.
//! 2. The per-key [`WriteThrottle`] rejects a second write to the same
//!    document inside the throttle window, including one racing a write
//!    that is still in flight.
//! 3. The document is overwritten and the write time recorded. A failed
//!    write releases its throttle slot.
//!
//! Both rejections happen before any network call.

use std::sync::Arc;

use tokio::task::JoinHandle;

use scopenotes_core::error::SyncResult;
use scopenotes_core::keys::remote_key;
use scopenotes_core::limits::SyncLimits;
use scopenotes_core::models::{Note, NoteScope, RemoteDocument, UrlContext};
use scopenotes_core::store::CacheStore;
use scopenotes_core::throttle::WriteThrottle;

use crate::legacy::{self, MigrationReport};
use crate::remote::DocumentStore;

pub struct RemoteSyncClient {
    user_id: String,
    store: Arc<dyn DocumentStore>,
    limits: SyncLimits,
    throttle: WriteThrottle,
}

impl RemoteSyncClient {
    pub fn new(user_id: impl Into<String>, store: Arc<dyn DocumentStore>, limits: SyncLimits) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            throttle: WriteThrottle::new(limits.throttle_ms),
            limits,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Validate, throttle-check, then overwrite the scope-context document.
    pub async fn save_notes(
        &self,
        scope: NoteScope,
        ctx: &UrlContext,
        notes: &[Note],
    ) -> SyncResult<RemoteDocument> {
        self.limits.validate(notes)?;

        let key = remote_key(scope, ctx);
        let slot = self.throttle.try_acquire(&key, now_ms())?;

        let doc = match self.store.set_document(&self.user_id, &key, notes).await {
            Ok(doc) => {
                self.throttle.commit(slot, now_ms());
                doc
            }
            Err(e) => {
                self.throttle.release(slot);
                return Err(e);
            }
        };
        tracing::debug!(
            user_id = %self.user_id,
            doc_id = %key,
            count = notes.len(),
            updated_at = doc.updated_at,
            "saved remote notes"
        );
        Ok(doc)
    }

    /// Point read. A missing document reads as an empty collection.
    pub async fn load_notes(&self, scope: NoteScope, ctx: &UrlContext) -> SyncResult<Vec<Note>> {
        let key = remote_key(scope, ctx);
        let doc = self.store.get_document(&self.user_id, &key).await?;
        Ok(doc.map(|d| d.notes).unwrap_or_default())
    }

    /// Deliver the scope-context's notes to `callback` now and after every
    /// remote change, until the returned [`Subscription`] is dropped.
    ///
    /// The first delivery happens before this returns.
    pub async fn subscribe_to_scope<F>(
        &self,
        scope: NoteScope,
        ctx: &UrlContext,
        callback: F,
    ) -> SyncResult<Subscription>
    where
        F: Fn(Vec<Note>) + Send + Sync + 'static,
    {
        let key = remote_key(scope, ctx);
        let mut rx = self.store.watch_document(&self.user_id, &key).await?;

        let initial = notes_of(rx.borrow_and_update().as_ref());
        callback(initial);

        let doc_id = key.clone();
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let notes = notes_of(rx.borrow_and_update().as_ref());
                callback(notes);
            }
            tracing::trace!(doc_id = %doc_id, "remote watch closed");
        });

        Ok(Subscription {
            scope,
            doc_id: key,
            task: Some(task),
        })
    }

    /// One-time sweep of legacy cache-only notes into this user's
    /// namespace. See [`legacy`](crate::legacy).
    pub async fn migrate_local_notes(&self, cache: &dyn CacheStore) -> SyncResult<MigrationReport> {
        legacy::migrate_local_notes(cache, self.store.as_ref(), &self.user_id, &self.limits).await
    }
}

fn notes_of(doc: Option<&RemoteDocument>) -> Vec<Note> {
    doc.map(|d| d.notes.clone()).unwrap_or_default()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Handle to a live scope-context listener. Dropping it, or calling
/// [`unsubscribe`](Subscription::unsubscribe), stops delivery.
#[derive(Debug)]
pub struct Subscription {
    scope: NoteScope,
    doc_id: String,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn scope(&self) -> NoteScope {
        self.scope
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}
