//! # scopenotes core
//!
//! Shared, runtime-agnostic logic for scopenotes: the note data model,
//! URL context resolution, scope-key derivation, write validation and
//! throttling, and the local cache store abstraction.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies.

pub mod context;
pub mod error;
pub mod keys;
pub mod limits;
pub mod models;
pub mod store;
pub mod throttle;

pub use error::{SyncError, SyncResult};
pub use models::{Note, NoteScope, RemoteDocument, UrlContext};
