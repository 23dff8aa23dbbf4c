//! # scopenotes CLI (`notes`)
//!
//! The `notes` binary drives the sync engine from a terminal: it resolves
//! URL contexts, reads and writes scoped notes through the orchestrator,
//! runs the legacy migration, and hosts the reference document server.
//!
//! ## Usage
//!
//! ```bash
//! notes --config ./config/notes.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `notes init` | Create the local cache database |
//! | `notes context <url>` | Show a URL's context and storage keys |
//! | `notes list <url>` | List notes for every visible scope |
//! | `notes add <url> --scope <s> <text>` | Add a note |
//! | `notes edit <url> --scope <s> <id> <text>` | Edit a note |
//! | `notes remove <url> --scope <s> <id>` | Remove a note |
//! | `notes migrate-legacy` | One-time copy of cache-only notes to the remote store |
//! | `notes pending [--flush]` | Show or push collections that never reached the remote |
//! | `notes watch <url>` | Print live remote updates |
//! | `notes serve` | Start the reference document server |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `scopenotes=info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use scopenotes::config::{self, Config};
use scopenotes::{migrate, notes_cmd, server};
use scopenotes_core::models::NoteScope;

/// scopenotes — notes attached to the browser, a domain, a host, or a page,
/// kept in a local cache and synced to a remote store.
#[derive(Parser)]
#[command(name = "notes", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/notes.toml")]
    config: PathBuf,

    /// Act as this user, overriding `[identity].user_id`.
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the local cache database. Idempotent.
    Init,

    /// Resolve a URL and print its context and per-scope keys.
    Context { url: String },

    /// List notes for a URL.
    List {
        url: String,
        /// Only this scope (browser, domain, subdomain, page).
        #[arg(long)]
        scope: Option<NoteScope>,
    },

    /// Add a note to one scope of a URL.
    Add {
        url: String,
        #[arg(long)]
        scope: NoteScope,
        text: String,
    },

    /// Replace the text of a note. `id` may be a unique prefix.
    Edit {
        url: String,
        #[arg(long)]
        scope: NoteScope,
        id: String,
        text: String,
    },

    /// Remove a note. `id` may be a unique prefix.
    Remove {
        url: String,
        #[arg(long)]
        scope: NoteScope,
        id: String,
    },

    /// Copy notes written before remote sync existed into the remote store.
    ///
    /// Runs at most once per install.
    MigrateLegacy,

    /// List collections saved locally but not yet synced.
    Pending {
        /// Push them to the remote store now.
        #[arg(long)]
        flush: bool,
    },

    /// Follow remote changes for a URL's scopes until interrupted.
    Watch { url: String },

    /// Start the reference remote document server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scopenotes=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Context { url } = &cli.command {
        return notes_cmd::run_context(url);
    }

    let cfg: Config = config::load_config(&cli.config)?;
    let user = cli.user.as_deref();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Cache initialized at {}.", cfg.cache.path.display());
        }
        Commands::Context { .. } => unreachable!(),
        Commands::List { url, scope } => {
            notes_cmd::run_list(&cfg, user, &url, scope).await?;
        }
        Commands::Add { url, scope, text } => {
            notes_cmd::run_add(&cfg, user, &url, scope, &text).await?;
        }
        Commands::Edit {
            url,
            scope,
            id,
            text,
        } => {
            notes_cmd::run_edit(&cfg, user, &url, scope, &id, &text).await?;
        }
        Commands::Remove { url, scope, id } => {
            notes_cmd::run_remove(&cfg, user, &url, scope, &id).await?;
        }
        Commands::MigrateLegacy => {
            notes_cmd::run_migrate_legacy(&cfg, user).await?;
        }
        Commands::Pending { flush } => {
            notes_cmd::run_pending(&cfg, user, flush).await?;
        }
        Commands::Watch { url } => {
            notes_cmd::run_watch(&cfg, user, &url).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
