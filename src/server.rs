//! Reference remote document server (`notes serve`).
//!
//! A small HTTP service that plays the part of the remote document store
//! for [`HttpDocumentStore`](crate::remote::http::HttpDocumentStore)
//! clients. Documents are kept in SQLite and namespaced per user.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/users/{user}/documents/{doc}` | Read one document |
//! | `PUT`  | `/users/{user}/documents/{doc}` | Overwrite one document |
//!
//! # Access rule
//!
//! Every document request must carry `x-user-id` equal to `{user}`;
//! anything else is rejected with 403 before the store is touched.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "rate_limited", "message": "please wait before saving again" } }
//! ```
//!
//! Error codes: `bad_request` (400), `forbidden` (403), `not_found` (404),
//! `rate_limited` (429), `unavailable` (503).
//!
//! Writes are validated and throttled with the same limits as the client,
//! per user and document.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use scopenotes_core::error::SyncError;
use scopenotes_core::limits::SyncLimits;
use scopenotes_core::models::{Note, RemoteDocument};
use scopenotes_core::throttle::WriteThrottle;

use crate::config::Config;
use crate::db;
use crate::migrate::ensure_schema;
use crate::remote::http::USER_HEADER;
use crate::remote::sqlite::SqliteDocumentStore;
use crate::remote::DocumentStore;

/// Shared state handed to every route handler.
#[derive(Clone)]
struct AppState {
    store: Arc<dyn DocumentStore>,
    limits: SyncLimits,
    throttle: Arc<WriteThrottle>,
}

/// Starts the document server on `[server].bind`, storing documents in
/// `[server].path`. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect_path(&config.server.path).await?;
    ensure_schema(&pool).await?;
    let store = SqliteDocumentStore::new(
        pool,
        Duration::from_millis(config.remote.poll_interval_ms),
    );

    let app = router(Arc::new(store), config.sync);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        bind = %config.server.bind,
        path = %config.server.path.display(),
        "document server listening"
    );
    println!("Document server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

/// The server's routes over any [`DocumentStore`].
pub fn router(store: Arc<dyn DocumentStore>, limits: SyncLimits) -> Router {
    let state = AppState {
        store,
        limits,
        throttle: Arc::new(WriteThrottle::new(limits.throttle_ms)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/users/{user}/documents/{doc}",
            get(handle_get_document).put(handle_put_document),
        )
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        let (status, code) = match &err {
            SyncError::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            SyncError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            SyncError::RemoteUnavailable(_) | SyncError::Cache(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }
        };
        let message = match err {
            SyncError::Validation(m)
            | SyncError::RateLimited(m)
            | SyncError::RemoteUnavailable(m)
            | SyncError::Cache(m) => m,
        };
        AppError {
            status,
            code,
            message,
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

/// Reject requests whose identity header does not own the namespace.
fn authorize(headers: &HeaderMap, user: &str) -> Result<(), AppError> {
    let caller = headers.get(USER_HEADER).and_then(|v| v.to_str().ok());
    if caller == Some(user) {
        return Ok(());
    }
    tracing::debug!(user = %user, caller = ?caller, "rejected cross-user request");
    Err(AppError {
        status: StatusCode::FORBIDDEN,
        code: "forbidden",
        message: format!("not allowed to access documents of {}", user),
    })
}

fn check_doc_id(doc: &str) -> Result<(), AppError> {
    if doc.is_empty() || doc.contains('/') {
        return Err(bad_request(format!("invalid document id: {:?}", doc)));
    }
    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /users/{user}/documents/{doc} ============

async fn handle_get_document(
    State(state): State<AppState>,
    Path((user, doc)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<RemoteDocument>, AppError> {
    authorize(&headers, &user)?;
    check_doc_id(&doc)?;

    state
        .store
        .get_document(&user, &doc)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("no document {}", doc)))
}

// ============ PUT /users/{user}/documents/{doc} ============

#[derive(Deserialize)]
struct PutDocumentBody {
    #[serde(default)]
    notes: Vec<Note>,
}

async fn handle_put_document(
    State(state): State<AppState>,
    Path((user, doc)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<PutDocumentBody>,
) -> Result<Json<RemoteDocument>, AppError> {
    authorize(&headers, &user)?;
    check_doc_id(&doc)?;
    state.limits.validate(&body.notes)?;

    let throttle_key = format!("{}/{}", user, doc);
    let slot = state.throttle.try_acquire(&throttle_key, now_ms())?;

    let saved = match state.store.set_document(&user, &doc, &body.notes).await {
        Ok(saved) => {
            state.throttle.commit(slot, now_ms());
            saved
        }
        Err(e) => {
            state.throttle.release(slot);
            return Err(e.into());
        }
    };
    tracing::debug!(
        user = %user,
        doc = %doc,
        count = body.notes.len(),
        updated_at = saved.updated_at,
        "document written"
    );
    Ok(Json(saved))
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
