//! One-time migration of cache-only notes into the remote store.
//!
//! Before remote sync existed, note collections lived only in the local
//! cache under `notes:<scope>[:<discriminator>]` keys. The sweep decodes
//! each such key, derives the matching remote document id, and copies the
//! collection over. A persisted flag keeps it from ever running twice on
//! the same install.
//!
//! Migration writes go straight to the [`DocumentStore`]: no throttle and
//! no validation. Collections that would fail live validation are still
//! written, and counted in [`MigrationReport::oversized`].

use serde::Serialize;

use scopenotes_core::error::SyncResult;
use scopenotes_core::keys::{parse_legacy_key, LOCAL_PREFIX};
use scopenotes_core::limits::SyncLimits;
use scopenotes_core::store::CacheStore;

use crate::remote::DocumentStore;

/// Cache flag recording that the sweep has completed on this install.
pub const MIGRATION_FLAG: &str = "_migrated_to_remote";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Collections copied to the remote store.
    pub migrated: usize,
    /// Keys that did not decode, or held no notes.
    pub skipped: usize,
    /// Collections whose remote write failed.
    pub failed: usize,
    /// Migrated collections that exceed the live write limits.
    pub oversized: usize,
    /// The flag was already set; nothing was scanned.
    pub already_done: bool,
}

/// Run the sweep for `user_id` unless it already ran on this install.
///
/// The flag is set once the sweep finishes, whatever the counts. A failed
/// write is logged and counted but does not stop the sweep.
pub async fn migrate_local_notes(
    cache: &dyn CacheStore,
    store: &dyn DocumentStore,
    user_id: &str,
    limits: &SyncLimits,
) -> SyncResult<MigrationReport> {
    if cache.get_flag(MIGRATION_FLAG).await? {
        tracing::debug!("legacy migration already done");
        return Ok(MigrationReport {
            already_done: true,
            ..MigrationReport::default()
        });
    }

    let mut report = MigrationReport::default();

    for key in cache.keys_with_prefix(LOCAL_PREFIX).await? {
        let Some(legacy) = parse_legacy_key(&key) else {
            tracing::debug!(key = %key, "skipping unrecognized cache key");
            report.skipped += 1;
            continue;
        };

        let notes = cache.get_notes(&key).await?;
        if notes.is_empty() {
            report.skipped += 1;
            continue;
        }
        if limits.validate(&notes).is_err() {
            tracing::warn!(
                key = %key,
                count = notes.len(),
                "legacy collection exceeds write limits, migrating anyway"
            );
            report.oversized += 1;
        }

        let doc_id = legacy.remote_key();
        match store.set_document(user_id, &doc_id, &notes).await {
            Ok(_) => {
                tracing::debug!(key = %key, doc_id = %doc_id, count = notes.len(), "migrated legacy notes");
                report.migrated += 1;
            }
            Err(e) => {
                tracing::warn!(key = %key, doc_id = %doc_id, error = %e, "legacy note migration failed");
                report.failed += 1;
            }
        }
    }

    cache.set_flag(MIGRATION_FLAG, true).await?;
    tracing::info!(
        migrated = report.migrated,
        skipped = report.skipped,
        failed = report.failed,
        "legacy migration complete"
    );
    Ok(report)
}
