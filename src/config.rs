//! TOML configuration parsing and validation.
//!
//! ```toml
//! [cache]
//! path = "./data/notes.sqlite"
//!
//! [remote]
//! provider = "http"            # disabled | memory | http
//! url = "http://127.0.0.1:7878"
//!
//! [sync]
//! max_notes = 100
//! max_note_chars = 50000
//! throttle_ms = 1000
//!
//! [identity]
//! user_id = "alice"
//!
//! [server]
//! bind = "127.0.0.1:7878"
//! path = "./data/remote.sqlite"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use scopenotes_core::limits::SyncLimits;

/// Environment variable consulted when `identity.user_id` is unset.
pub const USER_ID_ENV: &str = "SCOPENOTES_USER_ID";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncLimits,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// How often polling backends re-read a watched document.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl RemoteConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    2
}
fn default_poll_interval_ms() -> u64 {
    2_000
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IdentityConfig {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifierConfig {
    /// Tab events closer together than this collapse into one recompute.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Upper bound on how long an unbroken burst delays a recompute.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    250
}

/// Settings for the reference remote document server (`notes serve`).
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// SQLite file holding every user's remote documents.
    #[serde(default = "default_server_path")]
    pub path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            path: default_server_path(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7878".to_string()
}
fn default_server_path() -> PathBuf {
    PathBuf::from("./data/remote.sqlite")
}

impl Config {
    /// Defaults for commands that can run without a config file: cache in
    /// the working directory, remote sync disabled.
    pub fn minimal() -> Self {
        Self {
            cache: CacheConfig {
                path: PathBuf::from("./data/notes.sqlite"),
            },
            remote: RemoteConfig::default(),
            sync: SyncLimits::default(),
            identity: IdentityConfig::default(),
            notifier: NotifierConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.sync.max_notes == 0 {
        anyhow::bail!("sync.max_notes must be >= 1");
    }
    if config.sync.max_note_chars == 0 {
        anyhow::bail!("sync.max_note_chars must be >= 1");
    }
    if config.sync.throttle_ms <= 0 {
        anyhow::bail!("sync.throttle_ms must be > 0");
    }

    match config.remote.provider.as_str() {
        "disabled" | "memory" => {}
        "http" => {
            let raw = config
                .remote
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("remote.url must be specified when provider is 'http'"))?;
            url::Url::parse(raw).with_context(|| format!("remote.url is not a valid URL: {}", raw))?;
        }
        other => anyhow::bail!(
            "Unknown remote provider: '{}'. Must be disabled, memory, or http.",
            other
        ),
    }

    if config.remote.poll_interval_ms == 0 {
        anyhow::bail!("remote.poll_interval_ms must be > 0");
    }

    if let Some(user) = &config.identity.user_id {
        if user.trim().is_empty() {
            anyhow::bail!("identity.user_id must not be empty");
        }
    }

    Ok(())
}
