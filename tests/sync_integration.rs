//! End-to-end sync flows over the SQLite cache and the SQLite document
//! store, wired the way the CLI wires them.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use scopenotes::db;
use scopenotes::identity::SessionIdentity;
use scopenotes::legacy::MIGRATION_FLAG;
use scopenotes::migrate::ensure_schema;
use scopenotes::remote::memory::MemoryDocumentStore;
use scopenotes::remote::sqlite::SqliteDocumentStore;
use scopenotes::remote::DocumentStore;
use scopenotes::sqlite_cache::SqliteCache;
use scopenotes::{SaveOutcome, SyncOrchestrator};
use scopenotes_core::context::parse_url_context;
use scopenotes_core::limits::SyncLimits;
use scopenotes_core::models::{Note, NoteScope};
use scopenotes_core::store::CacheStore;
use scopenotes_core::SyncError;

async fn sqlite_cache(tmp: &TempDir) -> Arc<SqliteCache> {
    let pool = db::connect_path(&tmp.path().join("cache.sqlite")).await.unwrap();
    ensure_schema(&pool).await.unwrap();
    Arc::new(SqliteCache::new(pool))
}

fn orchestrator(
    cache: Arc<SqliteCache>,
    store: Arc<dyn DocumentStore>,
    user: Option<&str>,
) -> SyncOrchestrator {
    SyncOrchestrator::new(
        cache,
        Some(store),
        Arc::new(SessionIdentity::new(user.map(str::to_string))),
        SyncLimits::default(),
    )
}

#[tokio::test]
async fn test_offline_load_serves_cached_notes() {
    let tmp = TempDir::new().unwrap();
    let cache = sqlite_cache(&tmp).await;
    let store = Arc::new(MemoryDocumentStore::new());
    let note_a = Note::new("A");
    cache
        .set_notes("notes:page:example.com/test", &[note_a.clone()])
        .await
        .unwrap();
    store.set_offline(true);

    let orch = orchestrator(cache, store, Some("u1"));
    let ctx = parse_url_context("https://example.com/test").unwrap();
    let notes = orch.load_notes(NoteScope::Page, &ctx).await.unwrap();
    assert_eq!(notes, vec![note_a]);
}

#[tokio::test]
async fn test_two_devices_share_notes() {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect_path(&tmp.path().join("remote.sqlite")).await.unwrap();
    ensure_schema(&pool).await.unwrap();
    let store: Arc<dyn DocumentStore> =
        Arc::new(SqliteDocumentStore::new(pool, Duration::from_millis(20)));

    let laptop_dir = TempDir::new().unwrap();
    let phone_dir = TempDir::new().unwrap();
    let laptop = orchestrator(sqlite_cache(&laptop_dir).await, store.clone(), Some("u1"));
    let phone = orchestrator(sqlite_cache(&phone_dir).await, store.clone(), Some("u1"));

    let ctx = parse_url_context("https://app.example.com/dashboard?id=123").unwrap();
    let notes = vec![Note::new("deploy on fridays is fine")];

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _sub = phone
        .subscribe_to_scope(NoteScope::Subdomain, &ctx, move |notes| {
            let _ = tx.send(notes);
        })
        .await
        .expect("remote enabled");
    assert!(rx.recv().await.unwrap().is_empty());

    let outcome = laptop
        .save_notes(NoteScope::Subdomain, &ctx, &notes)
        .await
        .unwrap();
    assert!(outcome.is_synced());

    let pushed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pushed, notes);
    assert_eq!(phone.load_notes(NoteScope::Subdomain, &ctx).await.unwrap(), notes);
}

#[tokio::test]
async fn test_users_are_isolated() {
    let tmp = TempDir::new().unwrap();
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let alice = orchestrator(sqlite_cache(&tmp).await, store.clone(), Some("alice"));
    let other_tmp = TempDir::new().unwrap();
    let bob = orchestrator(sqlite_cache(&other_tmp).await, store, Some("bob"));

    let ctx = parse_url_context("https://example.com/").unwrap();
    alice
        .save_notes(NoteScope::Domain, &ctx, &[Note::new("private")])
        .await
        .unwrap();
    assert!(bob.load_notes(NoteScope::Domain, &ctx).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_legacy_migration_over_sqlite_cache() {
    let tmp = TempDir::new().unwrap();
    let cache = sqlite_cache(&tmp).await;
    let store = Arc::new(MemoryDocumentStore::new());
    let note_b = Note::new("B");
    cache
        .set_notes("notes:domain:example.com", &[note_b.clone()])
        .await
        .unwrap();
    cache
        .set_notes("notes:page:docs.rs/tokio/latest", &[Note::new("C")])
        .await
        .unwrap();

    let orch = orchestrator(cache.clone(), store.clone(), Some("u1"));
    let report = orch.migrate_legacy().await.unwrap().unwrap();
    assert_eq!(report.migrated, 2);
    assert!(cache.get_flag(MIGRATION_FLAG).await.unwrap());

    let doc = store
        .get_document("u1", "domain_example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.notes, vec![note_b]);
    assert!(store
        .get_document("u1", "page_docs.rs~tokio~latest")
        .await
        .unwrap()
        .is_some());

    let writes = store.write_count();
    let again = orch.migrate_legacy().await.unwrap().unwrap();
    assert!(again.already_done);
    assert_eq!(store.write_count(), writes);
}

#[tokio::test]
async fn test_validation_failure_keeps_local_copy() {
    let tmp = TempDir::new().unwrap();
    let cache = sqlite_cache(&tmp).await;
    let store = Arc::new(MemoryDocumentStore::new());
    let orch = orchestrator(cache.clone(), store.clone(), Some("u1"));
    let ctx = parse_url_context("https://example.com/").unwrap();

    let too_many: Vec<Note> = (0..101).map(|i| Note::new(format!("n{}", i))).collect();
    let outcome = orch
        .save_notes(NoteScope::Browser, &ctx, &too_many)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        SaveOutcome::LocalOnly {
            reason: Some(SyncError::Validation(_))
        }
    ));
    assert!(outcome.user_error().is_some());
    assert_eq!(store.write_count(), 0);
    assert_eq!(cache.get_notes("notes:browser").await.unwrap().len(), 101);
    assert_eq!(
        orch.pending_sync().await.unwrap(),
        vec!["notes:browser".to_string()]
    );
}

#[tokio::test]
async fn test_pending_survives_restart_and_flushes() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(MemoryDocumentStore::new());
    let ctx = parse_url_context("https://example.com/a").unwrap();
    let notes = vec![Note::new("queued")];

    {
        let orch = orchestrator(sqlite_cache(&tmp).await, store.clone(), Some("u1"));
        store.set_offline(true);
        let outcome = orch.save_notes(NoteScope::Page, &ctx, &notes).await.unwrap();
        assert!(!outcome.is_synced());
        assert!(outcome.user_error().is_none());
    }

    store.set_offline(false);
    let orch = orchestrator(sqlite_cache(&tmp).await, store.clone(), Some("u1"));
    assert_eq!(orch.pending_sync().await.unwrap().len(), 1);
    let report = orch.flush_pending().await.unwrap();
    assert_eq!(report.synced, 1);
    assert!(orch.pending_sync().await.unwrap().is_empty());
    let doc = store
        .get_document("u1", "page_example.com~a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.notes, notes);
}
