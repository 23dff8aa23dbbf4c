//! Dual-tier read/write orchestration.
//!
//! The [`SyncOrchestrator`] is the only component the presentation layer
//! talks to. It composes the local [`CacheStore`] with an optional
//! [`RemoteSyncClient`]:
//!
//! ```text
//!  save_notes ──▶ remote (best effort) ──▶ cache (always)
//!  load_notes ──▶ remote ──ok──▶ refresh cache ──▶ notes
//!                   └──err/none──▶ cache ──▶ notes
//! ```
//!
//! Remote failures never reach the caller as errors: a save that only
//! reached the cache returns [`SaveOutcome::LocalOnly`] and its key is
//! recorded as pending until a later save or [`flush_pending`] pushes it.
//! Cache failures do propagate.
//!
//! [`flush_pending`]: SyncOrchestrator::flush_pending

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use scopenotes_core::error::{SyncError, SyncResult};
use scopenotes_core::keys::{parse_legacy_key, storage_key};
use scopenotes_core::limits::SyncLimits;
use scopenotes_core::models::{Note, NoteScope, UrlContext};
use scopenotes_core::store::CacheStore;

use crate::identity::IdentityResolver;
use crate::legacy::MigrationReport;
use crate::remote::DocumentStore;
use crate::sync_client::{RemoteSyncClient, Subscription};

/// Cache key holding the local keys whose latest save never reached the
/// remote store.
pub const PENDING_KEY: &str = "_pending_sync";

/// Result of an orchestrated save. The cache write succeeded in both cases.
#[derive(Debug)]
pub enum SaveOutcome {
    /// Remote and cache both hold the new collection.
    Synced,
    /// Only the cache holds it. `reason` is `None` in cache-only mode.
    LocalOnly { reason: Option<SyncError> },
}

impl SaveOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, SaveOutcome::Synced)
    }

    /// The error an explicit user action should display, if any:
    /// validation and rate-limit failures only.
    pub fn user_error(&self) -> Option<&SyncError> {
        match self {
            SaveOutcome::LocalOnly { reason: Some(e) } if e.is_user_facing() => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub synced: usize,
    pub remaining: usize,
}

pub struct SyncOrchestrator {
    cache: Arc<dyn CacheStore>,
    store: Option<Arc<dyn DocumentStore>>,
    identity: Arc<dyn IdentityResolver>,
    limits: SyncLimits,
    client: Mutex<Option<Arc<RemoteSyncClient>>>,
    pending_lock: tokio::sync::Mutex<()>,
}

impl SyncOrchestrator {
    /// `store` is `None` when remote sync is disabled.
    pub fn new(
        cache: Arc<dyn CacheStore>,
        store: Option<Arc<dyn DocumentStore>>,
        identity: Arc<dyn IdentityResolver>,
        limits: SyncLimits,
    ) -> Self {
        Self {
            cache,
            store,
            identity,
            limits,
            client: Mutex::new(None),
            pending_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The remote client, constructing it on first use if an identity
    /// and a remote store are both available.
    fn client(&self) -> Option<Arc<RemoteSyncClient>> {
        let mut slot = self.client.lock().unwrap();
        if let Some(client) = slot.as_ref() {
            return Some(client.clone());
        }

        let store = self.store.as_ref()?;
        let user_id = self.identity.current_user_id()?;
        tracing::info!(user_id = %user_id, "remote sync enabled");
        let client = Arc::new(RemoteSyncClient::new(user_id, store.clone(), self.limits));
        *slot = Some(client.clone());
        Some(client)
    }

    /// Bind a remote client for `user_id`, replacing any existing one.
    ///
    /// Returns `false` when remote sync is disabled.
    pub fn sign_in(&self, user_id: impl Into<String>) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        let client = RemoteSyncClient::new(user_id, store.clone(), self.limits);
        *self.client.lock().unwrap() = Some(Arc::new(client));
        true
    }

    /// Drop the remote client. Later calls re-resolve identity lazily.
    pub fn sign_out(&self) {
        if self.client.lock().unwrap().take().is_some() {
            tracing::info!("remote sync disabled");
        }
    }

    pub fn is_remote_enabled(&self) -> bool {
        self.client().is_some()
    }

    /// Write-through: remote first (best effort), then the cache
    /// unconditionally.
    pub async fn save_notes(
        &self,
        scope: NoteScope,
        ctx: &UrlContext,
        notes: &[Note],
    ) -> SyncResult<SaveOutcome> {
        let local_key = storage_key(scope, ctx);

        let outcome = match self.client() {
            Some(client) => match client.save_notes(scope, ctx, notes).await {
                Ok(_) => SaveOutcome::Synced,
                Err(e) => {
                    tracing::warn!(key = %local_key, error = %e, "remote save failed, kept locally");
                    SaveOutcome::LocalOnly { reason: Some(e) }
                }
            },
            None => SaveOutcome::LocalOnly { reason: None },
        };

        self.cache.set_notes(&local_key, notes).await?;
        self.mark_pending(&local_key, !outcome.is_synced()).await?;
        Ok(outcome)
    }

    /// Read-through: remote preferred, cache on failure or when no remote
    /// client exists. A successful remote read refreshes the cache.
    pub async fn load_notes(&self, scope: NoteScope, ctx: &UrlContext) -> SyncResult<Vec<Note>> {
        let local_key = storage_key(scope, ctx);

        if let Some(client) = self.client() {
            match client.load_notes(scope, ctx).await {
                Ok(notes) => {
                    self.cache.set_notes(&local_key, &notes).await?;
                    self.mark_pending(&local_key, false).await?;
                    return Ok(notes);
                }
                Err(e) => {
                    tracing::warn!(key = %local_key, error = %e, "remote load failed, using cache");
                }
            }
        }

        self.cache.get_notes(&local_key).await
    }

    /// Listen for remote changes to a scope-context. `None` in cache-only
    /// mode or when the remote watch could not be established.
    pub async fn subscribe_to_scope<F>(
        &self,
        scope: NoteScope,
        ctx: &UrlContext,
        callback: F,
    ) -> Option<Subscription>
    where
        F: Fn(Vec<Note>) + Send + Sync + 'static,
    {
        let client = self.client()?;
        match client.subscribe_to_scope(scope, ctx, callback).await {
            Ok(sub) => Some(sub),
            Err(e) => {
                tracing::warn!(scope = %scope, error = %e, "remote subscribe failed");
                None
            }
        }
    }

    /// Run the one-time legacy sweep. `None` in cache-only mode.
    pub async fn migrate_legacy(&self) -> SyncResult<Option<MigrationReport>> {
        match self.client() {
            Some(client) => Ok(Some(client.migrate_local_notes(self.cache.as_ref()).await?)),
            None => Ok(None),
        }
    }

    /// Local keys whose latest save has not reached the remote store.
    pub async fn pending_sync(&self) -> SyncResult<Vec<String>> {
        Ok(self.read_pending().await?.into_iter().collect())
    }

    /// Push every pending collection through the normal validated write
    /// path. Keys that still fail stay pending.
    pub async fn flush_pending(&self) -> SyncResult<FlushReport> {
        let Some(client) = self.client() else {
            let remaining = self.read_pending().await?.len();
            return Ok(FlushReport { synced: 0, remaining });
        };

        let mut report = FlushReport::default();
        for key in self.pending_sync().await? {
            let Some(legacy) = parse_legacy_key(&key) else {
                tracing::warn!(key = %key, "dropping undecodable pending key");
                self.mark_pending(&key, false).await?;
                continue;
            };
            let notes = self.cache.get_notes(&key).await?;
            match client.save_notes(legacy.scope, &legacy.context, &notes).await {
                Ok(_) => {
                    self.mark_pending(&key, false).await?;
                    report.synced += 1;
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "pending sync still failing");
                    report.remaining += 1;
                }
            }
        }
        Ok(report)
    }

    async fn read_pending(&self) -> SyncResult<BTreeSet<String>> {
        Ok(match self.cache.get(PENDING_KEY).await? {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => BTreeSet::new(),
        })
    }

    async fn mark_pending(&self, key: &str, pending: bool) -> SyncResult<()> {
        let _guard = self.pending_lock.lock().await;
        let mut keys = self.read_pending().await?;
        let changed = if pending {
            keys.insert(key.to_string())
        } else {
            keys.remove(key)
        };
        if changed {
            self.cache
                .set(PENDING_KEY, serde_json::to_value(&keys)?)
                .await?;
        }
        Ok(())
    }
}
