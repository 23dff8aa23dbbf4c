//! Error taxonomy for the sync engine.
//!
//! URL parse failures are not represented here: the context resolver
//! returns `None` for unparseable input and never fails.

use thiserror::Error;

/// Result alias used by every library-level sync operation.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by the remote sync client, the stores, and the migrator.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Note count or note size exceeded. Raised before any network attempt.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A write to the same key landed inside the throttle window.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Network, auth, or transport failure talking to the remote store.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The local cache failed. Not expected in normal operation.
    #[error("cache error: {0}")]
    Cache(String),
}

impl SyncError {
    /// True for errors an explicit user action should see: validation and
    /// rate limiting. Transport failures are background noise.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, SyncError::Validation(_) | SyncError::RateLimited(_))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Cache(e.to_string())
    }
}
