//! Context change notification.
//!
//! Tab events from the host arrive untyped and unordered. They are parsed
//! once into [`TabMessage`] and only ever used as a wake-up signal: the
//! [`ContextChangeNotifier`] re-queries the active tab, resolves its
//! [`UrlContext`], and hands it to the single registered callback.
//! Bursts of events inside the debounce window collapse into one
//! recompute; a burst that never pauses still fires once the max delay
//! has passed since its first event.
//!
//! [`ScopeBinding`] is the consumer side: it holds one [`Subscription`]
//! per visible scope and replaces all of them whenever the context changes.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use scopenotes_core::context::parse_url_context;
use scopenotes_core::models::{Note, NoteScope, UrlContext};

use crate::orchestrator::SyncOrchestrator;
use crate::sync_client::Subscription;

/// Host message announcing that the active tab may have changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TabMessage {
    #[serde(rename = "TAB_CHANGED")]
    TabChanged {
        #[serde(rename = "tabId")]
        tab_id: i64,
    },
    #[serde(rename = "TAB_UPDATED")]
    TabUpdated {
        #[serde(rename = "tabId")]
        tab_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

impl TabMessage {
    /// Parse a raw host message. Anything that is not a recognized tab
    /// message yields `None`.
    pub fn from_json(raw: &str) -> Option<TabMessage> {
        match serde_json::from_str(raw) {
            Ok(msg) => Some(msg),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unrecognized host message");
                None
            }
        }
    }

    pub fn tab_id(&self) -> i64 {
        match self {
            TabMessage::TabChanged { tab_id } | TabMessage::TabUpdated { tab_id, .. } => *tab_id,
        }
    }
}

/// The host's "which tab is active" query.
#[async_trait]
pub trait TabQuery: Send + Sync {
    async fn active_tab_url(&self) -> Option<String>;
}

/// Resolve the active tab's context. `None` without an active tab, a URL,
/// or a parseable URL.
pub async fn get_current_tab_context(tabs: &dyn TabQuery) -> Option<UrlContext> {
    let url = tabs.active_tab_url().await?;
    parse_url_context(&url)
}

/// A [`TabQuery`] whose answer is set directly. Drives the CLI and tests.
#[derive(Default)]
pub struct ManualTab {
    url: RwLock<Option<String>>,
}

impl ManualTab {
    pub fn new(url: Option<String>) -> Self {
        Self {
            url: RwLock::new(url),
        }
    }

    pub fn set(&self, url: Option<String>) {
        *self.url.write().unwrap() = url;
    }
}

#[async_trait]
impl TabQuery for ManualTab {
    async fn active_tab_url(&self) -> Option<String> {
        self.url.read().unwrap().clone()
    }
}

type ContextCallback = Arc<dyn Fn(Option<UrlContext>) + Send + Sync>;

struct Registration {
    wake: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

/// Single-subscriber, debounced context recompute trigger.
pub struct ContextChangeNotifier {
    tabs: Arc<dyn TabQuery>,
    debounce: Duration,
    max_delay: Duration,
    current: Mutex<Option<Registration>>,
}

impl ContextChangeNotifier {
    /// The max delay defaults to five debounce windows.
    pub fn new(tabs: Arc<dyn TabQuery>, debounce: Duration) -> Self {
        Self {
            tabs,
            debounce,
            max_delay: debounce * 5,
            current: Mutex::new(None),
        }
    }

    /// Longest a continuous burst can hold back a recompute. Applies to
    /// listeners registered afterwards.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay.max(self.debounce);
        self
    }

    /// Install `callback` as the only listener. Any previous listener is
    /// torn down first and receives nothing further.
    pub fn register<F>(&self, callback: F)
    where
        F: Fn(Option<UrlContext>) + Send + Sync + 'static,
    {
        let callback: ContextCallback = Arc::new(callback);
        let (wake, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(recompute_loop(
            self.tabs.clone(),
            self.debounce,
            self.max_delay,
            rx,
            callback,
        ));

        let previous = self
            .current
            .lock()
            .unwrap()
            .replace(Registration { wake, task });
        if let Some(previous) = previous {
            previous.task.abort();
            tracing::debug!("replaced context listener");
        }
    }

    pub fn unregister(&self) {
        if let Some(previous) = self.current.lock().unwrap().take() {
            previous.task.abort();
        }
    }

    pub fn is_registered(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }

    /// Feed one host message. Returns `false` when nothing is registered.
    pub fn notify(&self, msg: &TabMessage) -> bool {
        tracing::trace!(tab_id = msg.tab_id(), "tab event");
        self.refresh()
    }

    /// Parse and feed a raw host message. Unrecognized payloads are dropped.
    pub fn notify_raw(&self, raw: &str) -> bool {
        match TabMessage::from_json(raw) {
            Some(msg) => self.notify(&msg),
            None => false,
        }
    }

    /// Schedule a recompute without a host event.
    pub fn refresh(&self) -> bool {
        match self.current.lock().unwrap().as_ref() {
            Some(reg) => reg.wake.send(()).is_ok(),
            None => false,
        }
    }
}

impl Drop for ContextChangeNotifier {
    fn drop(&mut self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(reg) = current.take() {
                reg.task.abort();
            }
        }
    }
}

async fn recompute_loop(
    tabs: Arc<dyn TabQuery>,
    debounce: Duration,
    max_delay: Duration,
    mut rx: mpsc::UnboundedReceiver<()>,
    callback: ContextCallback,
) {
    while rx.recv().await.is_some() {
        let deadline = Instant::now() + max_delay;
        let mut closed = false;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            match tokio::time::timeout(debounce.min(left), rx.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        let ctx = get_current_tab_context(tabs.as_ref()).await;
        tracing::debug!(url = ctx.as_ref().map(|c| c.url.as_str()), "context recomputed");
        callback(ctx);

        if closed {
            break;
        }
    }
}

type ScopeCallback = Arc<dyn Fn(NoteScope, Vec<Note>) + Send + Sync>;

/// The live subscriptions for the currently displayed context.
pub struct ScopeBinding {
    orchestrator: Arc<SyncOrchestrator>,
    context: Option<UrlContext>,
    subscriptions: Vec<Subscription>,
}

impl ScopeBinding {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            orchestrator,
            context: None,
            subscriptions: Vec::new(),
        }
    }

    /// Drop every existing subscription, then subscribe to each scope
    /// visible for `ctx`. `on_change` receives the scope alongside its
    /// notes. In cache-only mode no subscriptions are created.
    pub async fn rebind<F>(&mut self, ctx: Option<UrlContext>, on_change: F)
    where
        F: Fn(NoteScope, Vec<Note>) + Send + Sync + 'static,
    {
        self.clear();
        self.context = ctx.clone();
        let Some(ctx) = ctx else {
            return;
        };

        let on_change: ScopeCallback = Arc::new(on_change);
        for scope in NoteScope::visible_for(&ctx) {
            let on_change = on_change.clone();
            let sub = self
                .orchestrator
                .subscribe_to_scope(scope, &ctx, move |notes| on_change(scope, notes))
                .await;
            if let Some(sub) = sub {
                self.subscriptions.push(sub);
            }
        }
        tracing::debug!(
            url = %ctx.url,
            subscriptions = self.subscriptions.len(),
            "rebound scope subscriptions"
        );
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
        self.context = None;
    }

    pub fn context(&self) -> Option<&UrlContext> {
        self.context.as_ref()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}
