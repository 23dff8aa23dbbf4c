//! Note commands for the `notes` CLI.
//!
//! Each command opens the local cache, builds a [`SyncOrchestrator`] from
//! the configuration, and performs one read or read-modify-write cycle
//! through it, exactly as a UI would.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use scopenotes_core::context::parse_url_context;
use scopenotes_core::keys::{remote_key, storage_key};
use scopenotes_core::models::{Note, NoteScope, UrlContext};
use scopenotes_core::store::CacheStore;

use crate::config::Config;
use crate::db;
use crate::identity::SessionIdentity;
use crate::migrate::ensure_schema;
use crate::notifier::{ContextChangeNotifier, ManualTab, ScopeBinding, TabMessage};
use crate::orchestrator::{SaveOutcome, SyncOrchestrator};
use crate::remote::build_document_store;
use crate::sqlite_cache::SqliteCache;

/// Build the orchestrator described by `config`. `user` overrides the
/// configured identity.
pub async fn open_orchestrator(config: &Config, user: Option<&str>) -> Result<Arc<SyncOrchestrator>> {
    let pool = db::connect(config).await?;
    ensure_schema(&pool).await?;
    let cache: Arc<dyn CacheStore> = Arc::new(SqliteCache::new(pool));
    let store = build_document_store(config)?;
    let identity = Arc::new(SessionIdentity::from_config(config));

    let orchestrator = SyncOrchestrator::new(cache, store, identity, config.sync);
    if let Some(user) = user {
        if !orchestrator.sign_in(user) {
            tracing::warn!("--user ignored: remote sync is disabled");
        }
    }
    Ok(Arc::new(orchestrator))
}

fn resolve(url: &str) -> Result<UrlContext> {
    parse_url_context(url).with_context(|| format!("not an absolute URL with a host: {}", url))
}

// ============ collection edits ============

/// Append a new note and return its id.
pub fn add_note(notes: &mut Vec<Note>, text: &str) -> Result<String> {
    if text.trim().is_empty() {
        bail!("note text must not be empty");
    }
    let note = Note::new(text);
    let id = note.id.clone();
    notes.push(note);
    Ok(id)
}

/// Index of the note whose id equals `id` or uniquely starts with it.
pub fn find_note(notes: &[Note], id: &str) -> Result<usize> {
    if let Some(idx) = notes.iter().position(|n| n.id == id) {
        return Ok(idx);
    }
    let matches: Vec<usize> = notes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.id.starts_with(id))
        .map(|(i, _)| i)
        .collect();
    match matches.as_slice() {
        [idx] => Ok(*idx),
        [] => bail!("no note with id {}", id),
        _ => bail!("id prefix {} is ambiguous", id),
    }
}

pub fn edit_note(notes: &mut [Note], id: &str, text: &str) -> Result<String> {
    if text.trim().is_empty() {
        bail!("note text must not be empty");
    }
    let idx = find_note(notes, id)?;
    notes[idx].edit(text);
    Ok(notes[idx].id.clone())
}

pub fn remove_note(notes: &mut Vec<Note>, id: &str) -> Result<Note> {
    let idx = find_note(notes, id)?;
    Ok(notes.remove(idx))
}

// ============ CLI entry points ============

/// `notes context <url>`: print the resolved context and every key.
pub fn run_context(url: &str) -> Result<()> {
    let ctx = resolve(url)?;
    println!("url:        {}", ctx.url);
    println!("domain:     {}", ctx.domain);
    println!("subdomain:  {}", ctx.subdomain);
    println!("path:       {}", ctx.path);
    println!("full_path:  {}", ctx.full_path);
    println!();
    for scope in NoteScope::visible_for(&ctx) {
        println!(
            "{:<10} local={}  remote={}",
            scope.as_str(),
            storage_key(scope, &ctx),
            remote_key(scope, &ctx)
        );
    }
    Ok(())
}

pub async fn run_list(
    config: &Config,
    user: Option<&str>,
    url: &str,
    scope: Option<NoteScope>,
) -> Result<()> {
    let ctx = resolve(url)?;
    let orchestrator = open_orchestrator(config, user).await?;
    let scopes = match scope {
        Some(s) => vec![s],
        None => NoteScope::visible_for(&ctx),
    };

    for scope in scopes {
        let notes = orchestrator.load_notes(scope, &ctx).await?;
        print_scope(scope, &notes);
    }
    Ok(())
}

pub async fn run_add(
    config: &Config,
    user: Option<&str>,
    url: &str,
    scope: NoteScope,
    text: &str,
) -> Result<()> {
    let ctx = resolve(url)?;
    let orchestrator = open_orchestrator(config, user).await?;
    let mut notes = orchestrator.load_notes(scope, &ctx).await?;
    let id = add_note(&mut notes, text)?;
    let outcome = orchestrator.save_notes(scope, &ctx, &notes).await?;
    println!("Added note {} to {}.", id, scope);
    report_outcome(&outcome);
    Ok(())
}

pub async fn run_edit(
    config: &Config,
    user: Option<&str>,
    url: &str,
    scope: NoteScope,
    id: &str,
    text: &str,
) -> Result<()> {
    let ctx = resolve(url)?;
    let orchestrator = open_orchestrator(config, user).await?;
    let mut notes = orchestrator.load_notes(scope, &ctx).await?;
    let id = edit_note(&mut notes, id, text)?;
    let outcome = orchestrator.save_notes(scope, &ctx, &notes).await?;
    println!("Updated note {} in {}.", id, scope);
    report_outcome(&outcome);
    Ok(())
}

pub async fn run_remove(
    config: &Config,
    user: Option<&str>,
    url: &str,
    scope: NoteScope,
    id: &str,
) -> Result<()> {
    let ctx = resolve(url)?;
    let orchestrator = open_orchestrator(config, user).await?;
    let mut notes = orchestrator.load_notes(scope, &ctx).await?;
    let removed = remove_note(&mut notes, id)?;
    let outcome = orchestrator.save_notes(scope, &ctx, &notes).await?;
    println!("Removed note {} from {}.", removed.id, scope);
    report_outcome(&outcome);
    Ok(())
}

pub async fn run_migrate_legacy(config: &Config, user: Option<&str>) -> Result<()> {
    let orchestrator = open_orchestrator(config, user).await?;
    match orchestrator.migrate_legacy().await? {
        None => bail!("remote sync is not enabled: configure [remote] and a user id"),
        Some(report) if report.already_done => {
            println!("Legacy notes were already migrated on this install.");
        }
        Some(report) => {
            println!("Legacy migration complete.");
            println!("  migrated:  {}", report.migrated);
            println!("  skipped:   {}", report.skipped);
            println!("  failed:    {}", report.failed);
            if report.oversized > 0 {
                println!("  oversized: {} (migrated beyond write limits)", report.oversized);
            }
        }
    }
    Ok(())
}

pub async fn run_pending(config: &Config, user: Option<&str>, flush: bool) -> Result<()> {
    let orchestrator = open_orchestrator(config, user).await?;

    if flush {
        let report = orchestrator.flush_pending().await?;
        println!(
            "Flushed pending notes: {} synced, {} remaining.",
            report.synced, report.remaining
        );
        return Ok(());
    }

    let pending = orchestrator.pending_sync().await?;
    if pending.is_empty() {
        println!("All notes are synced.");
    } else {
        println!("{} collection(s) not yet synced:", pending.len());
        for key in pending {
            println!("  {}", key);
        }
    }
    Ok(())
}

/// `notes watch <url>`: print live updates for every visible scope.
///
/// Each stdin line switches the active tab: either a URL, or a raw
/// `TAB_CHANGED`/`TAB_UPDATED` JSON message. Runs until Ctrl-C.
pub async fn run_watch(config: &Config, user: Option<&str>, url: &str) -> Result<()> {
    let orchestrator = open_orchestrator(config, user).await?;
    if !orchestrator.is_remote_enabled() {
        bail!("remote sync is not enabled: configure [remote] and a user id");
    }

    let tab = Arc::new(ManualTab::new(Some(url.to_string())));
    let notifier = ContextChangeNotifier::new(
        tab.clone(),
        Duration::from_millis(config.notifier.debounce_ms),
    )
    .with_max_delay(Duration::from_millis(config.notifier.max_delay_ms));
    let (ctx_tx, mut ctx_rx) = mpsc::unbounded_channel();
    notifier.register(move |ctx| {
        let _ = ctx_tx.send(ctx);
    });
    notifier.refresh();

    let mut binding = ScopeBinding::new(orchestrator);
    let interactive = std::io::stdin().is_terminal();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    if interactive {
        eprintln!("Watching. Enter a URL to switch tabs, Ctrl-C to stop.");
    }

    loop {
        tokio::select! {
            Some(ctx) = ctx_rx.recv() => {
                match &ctx {
                    Some(c) => println!("== context {} ==", c.url),
                    None => println!("== no active context =="),
                }
                binding.rebind(ctx, |scope, notes| print_scope(scope, &notes)).await;
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => switch_tab(&notifier, &tab, line.trim()),
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    notifier.unregister();
    Ok(())
}

fn switch_tab(notifier: &ContextChangeNotifier, tab: &ManualTab, line: &str) {
    if line.is_empty() {
        return;
    }
    if line.starts_with('{') {
        if let Some(msg) = TabMessage::from_json(line) {
            if let TabMessage::TabUpdated { url: Some(url), .. } = &msg {
                tab.set(Some(url.clone()));
            }
            notifier.notify(&msg);
        } else {
            eprintln!("ignored message: {}", line);
        }
        return;
    }
    tab.set(Some(line.to_string()));
    notifier.refresh();
}

fn print_scope(scope: NoteScope, notes: &[Note]) {
    println!("--- {} ({}) ---", scope, notes.len());
    for note in notes {
        println!("{}  {}", short_id(&note.id), note.text);
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn report_outcome(outcome: &SaveOutcome) {
    match outcome {
        SaveOutcome::Synced => println!("Synced."),
        SaveOutcome::LocalOnly { reason: None } => println!("Saved locally (remote sync disabled)."),
        SaveOutcome::LocalOnly { reason: Some(e) } => {
            if outcome.user_error().is_some() {
                eprintln!("Warning: {}", e);
            }
            println!("Saved locally; remote sync pending.");
        }
    }
}
