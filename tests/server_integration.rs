//! The reference document server driven over real HTTP, both with raw
//! requests and through the `http` remote backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use scopenotes::config::{Config, RemoteConfig};
use scopenotes::identity::SessionIdentity;
use scopenotes::remote::http::HttpDocumentStore;
use scopenotes::remote::DocumentStore;
use scopenotes::server::run_server;
use scopenotes::SyncOrchestrator;
use scopenotes_core::context::parse_url_context;
use scopenotes_core::limits::SyncLimits;
use scopenotes_core::models::{Note, NoteScope};
use scopenotes_core::store::memory::InMemoryCache;
use scopenotes_core::SyncError;

fn test_config(tmp: &TempDir, port: u16) -> Config {
    let root = tmp.path();
    let config_content = format!(
        r#"
[cache]
path = "{root}/cache.sqlite"

[remote]
provider = "http"
url = "http://127.0.0.1:{port}"
poll_interval_ms = 50
max_retries = 0

[server]
bind = "127.0.0.1:{port}"
path = "{root}/remote.sqlite"
"#,
        root = root.display(),
        port = port
    );
    toml::from_str(&config_content).unwrap()
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

async fn start_server(tmp: &TempDir) -> (Config, tokio::task::JoinHandle<()>) {
    let port = find_free_port();
    let cfg = test_config(tmp, port);
    let cfg_clone = cfg.clone();
    let handle = tokio::spawn(async move {
        run_server(&cfg_clone).await.ok();
    });
    wait_for_server(port).await;
    (cfg, handle)
}

fn base_url(cfg: &Config) -> String {
    format!("http://{}", cfg.server.bind)
}

#[tokio::test]
async fn test_health() {
    let tmp = TempDir::new().unwrap();
    let (cfg, handle) = start_server(&tmp).await;

    let body: Value = reqwest::get(format!("{}/health", base_url(&cfg)))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());

    handle.abort();
}

#[tokio::test]
async fn test_raw_document_protocol() {
    let tmp = TempDir::new().unwrap();
    let (cfg, handle) = start_server(&tmp).await;
    let client = reqwest::Client::new();
    let doc_url = format!("{}/users/u1/documents/domain_example.com", base_url(&cfg));

    // Missing document
    let resp = client
        .get(&doc_url)
        .header("x-user-id", "u1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Write, then read back
    let note = json!({"id": "n1", "text": "hi", "createdAt": 1, "updatedAt": 1});
    let resp = client
        .put(&doc_url)
        .header("x-user-id", "u1")
        .json(&json!({ "notes": [note] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let written: Value = resp.json().await.unwrap();
    assert!(written["updatedAt"].as_i64().unwrap() > 0);

    let read: Value = client
        .get(&doc_url)
        .header("x-user-id", "u1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(read["notes"][0]["text"], "hi");

    // Immediate second write to the same document
    let resp = client
        .put(&doc_url)
        .header("x-user-id", "u1")
        .json(&json!({ "notes": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "rate_limited");

    handle.abort();
}

#[tokio::test]
async fn test_concurrent_writes_to_one_document_are_throttled() {
    let tmp = TempDir::new().unwrap();
    let (cfg, handle) = start_server(&tmp).await;
    let client = reqwest::Client::new();
    let doc_url = format!("{}/users/u1/documents/browser", base_url(&cfg));

    let put = |text: &'static str| {
        client
            .put(&doc_url)
            .header("x-user-id", "u1")
            .json(&json!({ "notes": [{"id": text, "text": text, "createdAt": 1, "updatedAt": 1}] }))
            .send()
    };
    let (a, b) = tokio::join!(put("a"), put("b"));
    let mut statuses = vec![a.unwrap().status().as_u16(), b.unwrap().status().as_u16()];
    statuses.sort();
    assert_eq!(statuses, vec![200, 429]);

    handle.abort();
}

#[tokio::test]
async fn test_cross_user_access_forbidden() {
    let tmp = TempDir::new().unwrap();
    let (cfg, handle) = start_server(&tmp).await;
    let client = reqwest::Client::new();
    let doc_url = format!("{}/users/alice/documents/browser", base_url(&cfg));

    let resp = client
        .get(&doc_url)
        .header("x-user-id", "mallory")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .put(&doc_url)
        .json(&json!({ "notes": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "forbidden");

    handle.abort();
}

#[tokio::test]
async fn test_server_rejects_oversized_collections() {
    let tmp = TempDir::new().unwrap();
    let (cfg, handle) = start_server(&tmp).await;
    let store = HttpDocumentStore::new(&cfg.remote).unwrap();

    let notes: Vec<Note> = (0..101).map(|i| Note::new(format!("n{}", i))).collect();
    let err = store.set_document("u1", "browser", &notes).await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(ref m) if m == "maximum 100 notes"));

    handle.abort();
}

#[tokio::test]
async fn test_orchestrator_over_http() {
    let tmp = TempDir::new().unwrap();
    let (cfg, handle) = start_server(&tmp).await;
    let store: Arc<dyn DocumentStore> = Arc::new(HttpDocumentStore::new(&cfg.remote).unwrap());

    let writer = SyncOrchestrator::new(
        Arc::new(InMemoryCache::new()),
        Some(store.clone()),
        Arc::new(SessionIdentity::new(Some("u1".to_string()))),
        SyncLimits::default(),
    );
    let reader = SyncOrchestrator::new(
        Arc::new(InMemoryCache::new()),
        Some(store),
        Arc::new(SessionIdentity::new(Some("u1".to_string()))),
        SyncLimits::default(),
    );

    let ctx = parse_url_context("https://app.example.com/dashboard?id=123").unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _sub = reader
        .subscribe_to_scope(NoteScope::Page, &ctx, move |notes| {
            let _ = tx.send(notes);
        })
        .await
        .expect("remote enabled");
    assert!(rx.recv().await.unwrap().is_empty());

    let notes = vec![Note::new("shipped")];
    let outcome = writer.save_notes(NoteScope::Page, &ctx, &notes).await.unwrap();
    assert!(outcome.is_synced());

    let pushed = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pushed, notes);
    assert_eq!(reader.load_notes(NoteScope::Page, &ctx).await.unwrap(), notes);

    handle.abort();
}

#[tokio::test]
async fn test_unreachable_server_falls_back_to_cache() {
    let port = find_free_port();
    let remote = RemoteConfig {
        provider: "http".to_string(),
        url: Some(format!("http://127.0.0.1:{}", port)),
        timeout_secs: 1,
        max_retries: 0,
        ..RemoteConfig::default()
    };
    let store: Arc<dyn DocumentStore> = Arc::new(HttpDocumentStore::new(&remote).unwrap());
    let orch = SyncOrchestrator::new(
        Arc::new(InMemoryCache::new()),
        Some(store),
        Arc::new(SessionIdentity::new(Some("u1".to_string()))),
        SyncLimits::default(),
    );

    let ctx = parse_url_context("https://example.com/test").unwrap();
    let notes = vec![Note::new("A")];
    let outcome = orch.save_notes(NoteScope::Page, &ctx, &notes).await.unwrap();
    assert!(matches!(
        outcome,
        scopenotes::SaveOutcome::LocalOnly {
            reason: Some(SyncError::RemoteUnavailable(_))
        }
    ));
    assert_eq!(orch.load_notes(NoteScope::Page, &ctx).await.unwrap(), notes);
}
