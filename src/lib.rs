//! # scopenotes
//!
//! Notes attached to browsing context at four granularities (whole browser,
//! registrable domain, host, single page), kept in a fast local cache and
//! synced to a per-user remote document store.
//!
//! ## Architecture
//!
//! ```text
//!  tab event ──▶ ContextChangeNotifier ──▶ UrlContext ──▶ ScopeBinding
//!                                                          │ subscribe
//!  UI ──▶ SyncOrchestrator ──┬──▶ RemoteSyncClient ──▶ DocumentStore
//!                            │    (validate, throttle)   memory/http/sqlite
//!                            └──▶ CacheStore (SQLite)
//! ```
//!
//! Context resolution, key derivation, limits and the throttle live in the
//! runtime-agnostic [`scopenotes_core`] crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Schema setup |
//! | [`sqlite_cache`] | SQLite-backed local cache |
//! | [`remote`] | Remote document store trait and backends |
//! | [`identity`] | Current user resolution |
//! | [`sync_client`] | Per-user validated, throttled remote client |
//! | [`orchestrator`] | Write-through / read-through over cache and remote |
//! | [`legacy`] | One-time migration of cache-only notes |
//! | [`notifier`] | Tab events, context recompute, scope rebinding |
//! | [`notes_cmd`] | CLI commands |
//! | [`server`] | Reference remote document server |

pub mod config;
pub mod db;
pub mod identity;
pub mod legacy;
pub mod migrate;
pub mod notes_cmd;
pub mod notifier;
pub mod orchestrator;
pub mod remote;
pub mod server;
pub mod sqlite_cache;
pub mod sync_client;

pub use orchestrator::{SaveOutcome, SyncOrchestrator};
pub use sync_client::{RemoteSyncClient, Subscription};
