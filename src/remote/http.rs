//! HTTP [`DocumentStore`] client for a `notes serve` compatible server.
//!
//! | Method | Path |
//! |--------|------|
//! | `GET` | `/users/{user}/documents/{doc}` |
//! | `PUT` | `/users/{user}/documents/{doc}` with `{ "notes": [...] }` |
//!
//! Every request carries the caller's identity in `x-user-id`.
//!
//! Retry strategy:
//! - `GET`: HTTP 5xx or network error → retry with exponential backoff
//! - `PUT`: retried only when the connection was never established; once
//!   the request may have reached the server a repeat could land inside
//!   the server's throttle window, so the error is returned as-is
//! - HTTP 400 → [`SyncError::Validation`], no retry
//! - HTTP 429 → [`SyncError::RateLimited`], no retry
//! - anything else → [`SyncError::RemoteUnavailable`]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use url::Url;

use scopenotes_core::error::{SyncError, SyncResult};
use scopenotes_core::models::{Note, RemoteDocument};

use super::{spawn_poller, DocumentStore, DocumentWatch};
use crate::config::RemoteConfig;

/// Header carrying the authenticated user id.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct HttpDocumentStore {
    inner: Arc<Inner>,
}

struct Inner {
    client: reqwest::Client,
    base: Url,
    max_retries: u32,
    poll_interval: Duration,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[allow(dead_code)]
    code: String,
    message: String,
}

impl HttpDocumentStore {
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        let raw = config
            .url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("remote.url required for http provider"))?;
        let base = Url::parse(raw)?;
        if base.cannot_be_a_base() {
            anyhow::bail!("remote.url cannot be used as a base URL: {}", raw);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                base,
                max_retries: config.max_retries,
                poll_interval: Duration::from_millis(config.poll_interval_ms),
            }),
        })
    }
}

impl Inner {
    fn document_url(&self, user_id: &str, doc_id: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["users", user_id, "documents", doc_id]);
        }
        url
    }

    /// Send one request with retry. `Ok(None)` means 404.
    async fn send(
        &self,
        method: Method,
        user_id: &str,
        doc_id: &str,
        body: Option<serde_json::Value>,
    ) -> SyncResult<Option<RemoteDocument>> {
        let url = self.document_url(user_id, doc_id);
        let idempotent = method == Method::GET;
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 200ms, 400ms, 800ms, ...
                let delay = Duration::from_millis(200 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .header(USER_HEADER, user_id);
            if let Some(body) = &body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(%url, attempt, error = %e, "remote request failed");
                    let err = SyncError::RemoteUnavailable(e.to_string());
                    if !idempotent && !e.is_connect() {
                        return Err(err);
                    }
                    last_err = Some(err);
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let doc: RemoteDocument = response
                    .json()
                    .await
                    .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;
                return Ok(Some(doc));
            }
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            let message = error_message(response).await;
            match status {
                StatusCode::BAD_REQUEST => return Err(SyncError::Validation(message)),
                StatusCode::TOO_MANY_REQUESTS => return Err(SyncError::RateLimited(message)),
                s if s.is_server_error() => {
                    let err =
                        SyncError::RemoteUnavailable(format!("remote error {}: {}", s, message));
                    if !idempotent {
                        return Err(err);
                    }
                    last_err = Some(err);
                    continue;
                }
                s => {
                    return Err(SyncError::RemoteUnavailable(format!(
                        "remote error {}: {}",
                        s, message
                    )))
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            SyncError::RemoteUnavailable("remote request failed after retries".to_string())
        }))
    }
}

async fn error_message(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.error.message,
        Err(_) => text,
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get_document(
        &self,
        user_id: &str,
        doc_id: &str,
    ) -> SyncResult<Option<RemoteDocument>> {
        self.inner.send(Method::GET, user_id, doc_id, None).await
    }

    async fn set_document(
        &self,
        user_id: &str,
        doc_id: &str,
        notes: &[Note],
    ) -> SyncResult<RemoteDocument> {
        let body = serde_json::json!({ "notes": notes });
        self.inner
            .send(Method::PUT, user_id, doc_id, Some(body))
            .await?
            .ok_or_else(|| SyncError::RemoteUnavailable("write returned not found".to_string()))
    }

    async fn watch_document(&self, user_id: &str, doc_id: &str) -> SyncResult<DocumentWatch> {
        let inner = self.inner.clone();
        let user_id = user_id.to_string();
        let doc_id = doc_id.to_string();
        spawn_poller(self.inner.poll_interval, move || {
            let inner = inner.clone();
            let user_id = user_id.clone();
            let doc_id = doc_id.clone();
            async move { inner.send(Method::GET, &user_id, &doc_id, None).await }
        })
        .await
    }
}
