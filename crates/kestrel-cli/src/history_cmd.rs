//! `kestrel history`: inspect and edit persisted chat histories.
//!
//! - `kestrel history list`: every stored history
//! - `kestrel history show --key k=v [-n N]`: messages of one history
//! - `kestrel history search --key k=v QUERY [-k N]`: similarity search
//! - `kestrel history append --key k=v [--role R] TEXT`: add a message
//! - `kestrel history clear --key k=v`: delete all messages and cached decisions

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use kestrel_agent::{AgentContext, ContextOptions};
use kestrel_core::config::Config;
use kestrel_core::history::{ChatHistory, HistoryOptions};
use kestrel_core::types::{ContextKeys, Role};
use kestrel_core::Backends;

use crate::helpers::{format_keys, parse_keys, print_header, print_message};

// ─────────────────────────────────────────────
// Subcommand enum
// ─────────────────────────────────────────────

/// History subcommands.
#[derive(Subcommand)]
pub enum HistoryCommands {
    /// List stored chat histories
    List,

    /// Show the messages of a history
    Show {
        /// Context key, as name=value (repeatable)
        #[arg(long, required = true)]
        key: Vec<String>,

        /// Only the last N messages
        #[arg(short = 'n', long)]
        last: Option<usize>,
    },

    /// Search a history's indexed messages
    Search {
        /// Context key, as name=value (repeatable)
        #[arg(long, required = true)]
        key: Vec<String>,

        /// Text to search for
        query: String,

        /// Number of results (defaults to history.searchK)
        #[arg(short)]
        k: Option<usize>,
    },

    /// Append a message, creating the history if needed
    Append {
        /// Context key, as name=value (repeatable)
        #[arg(long, required = true)]
        key: Vec<String>,

        /// Message role (user, system, assistant, agent, tool, llm)
        #[arg(short, long, default_value = "user")]
        role: String,

        /// Message text
        text: String,
    },

    /// Delete every message of a history
    Clear {
        /// Context key, as name=value (repeatable)
        #[arg(long, required = true)]
        key: Vec<String>,
    },
}

// ─────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────

/// Dispatch a history subcommand.
pub fn dispatch(cmd: HistoryCommands) -> Result<()> {
    let config = crate::config();
    let backends = crate::open_backends(&config)?;

    match cmd {
        HistoryCommands::List => list(&backends),
        HistoryCommands::Show { key, last } => show(&backends, &config, &parse_keys(&key)?, last),
        HistoryCommands::Search { key, query, k } => {
            let k = k.unwrap_or(config.history.search_k);
            search(&backends, &config, &parse_keys(&key)?, &query, k)
        }
        HistoryCommands::Append { key, role, text } => {
            let role: Role = role.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            append(&backends, &config, &parse_keys(&key)?, role, &text)
        }
        HistoryCommands::Clear { key } => clear(&backends, &config, &parse_keys(&key)?),
    }
}

// ─────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────

fn open(backends: &Backends, config: &Config, keys: &ContextKeys) -> Result<ChatHistory> {
    ChatHistory::get_or_create(
        backends.histories.clone(),
        backends.indexes.as_ref(),
        keys,
        Vec::new(),
        &HistoryOptions::from(&config.history),
    )
    .with_context(|| format!("failed to open history for {}", format_keys(keys)))
}

/// Open an existing history, or `None` (with a notice) if there is none.
fn open_existing(backends: &Backends, config: &Config, keys: &ContextKeys) -> Result<Option<ChatHistory>> {
    if backends.histories.find(keys)?.is_empty() {
        println!("  {} No history for {}", "✗".red(), format_keys(keys));
        return Ok(None);
    }
    open(backends, config, keys).map(Some)
}

// ─────────────────────────────────────────────
// Command implementations
// ─────────────────────────────────────────────

/// `kestrel history list`
fn list(backends: &Backends) -> Result<()> {
    let summaries = backends.histories.list().context("failed to list histories")?;
    if summaries.is_empty() {
        println!("  No chat histories.");
        return Ok(());
    }

    print_header("Chat Histories");
    println!(
        "  {:<38} {:<10} {:<18} {}",
        "ID".bold(),
        "Messages".bold(),
        "Updated".bold(),
        "Keys".bold(),
    );
    println!("  {}", "─".repeat(90));

    for summary in &summaries {
        println!(
            "  {:<38} {:<10} {:<18} {}",
            summary.id,
            summary.message_count,
            summary.updated_at.format("%Y-%m-%d %H:%M"),
            format_keys(&summary.context_keys),
        );
    }
    println!();
    Ok(())
}

/// `kestrel history show`
fn show(backends: &Backends, config: &Config, keys: &ContextKeys, last: Option<usize>) -> Result<()> {
    let Some(history) = open_existing(backends, config, keys)? else {
        return Ok(());
    };
    let messages = history.messages();
    let skip = last.map_or(0, |n| messages.len().saturating_sub(n));

    print_header(&format!("History {} ({} messages)", history.id(), messages.len()));
    for message in &messages[skip..] {
        print_message(message);
    }
    println!();
    Ok(())
}

/// `kestrel history search`
fn search(backends: &Backends, config: &Config, keys: &ContextKeys, query: &str, k: usize) -> Result<()> {
    let Some(history) = open_existing(backends, config, keys)? else {
        return Ok(());
    };
    let hits = history.search(query, k).context("search failed")?;
    if hits.is_empty() {
        println!("  No matches for '{query}'.");
        return Ok(());
    }

    print_header(&format!("Results for '{query}'"));
    for hit in &hits {
        println!(
            "  {} {}",
            format!("{:>5.2}", hit.score).dimmed(),
            hit.tag.text.as_deref().unwrap_or("")
        );
    }
    println!();
    Ok(())
}

/// `kestrel history append`
fn append(backends: &Backends, config: &Config, keys: &ContextKeys, role: Role, text: &str) -> Result<()> {
    let history = open(backends, config, keys)?;
    let message = history
        .append_message_with_role(text, role, Vec::new())
        .context("failed to append message")?;
    println!(
        "  {} Appended {} message {} to {}",
        "✓".green(),
        role,
        message.id.cyan(),
        history.id()
    );
    Ok(())
}

/// `kestrel history clear`: the messages and the context's caches.
fn clear(backends: &Backends, config: &Config, keys: &ContextKeys) -> Result<()> {
    if open_existing(backends, config, keys)?.is_none() {
        return Ok(());
    }
    let options = ContextOptions {
        use_action_cache: true,
        use_llm_cache: true,
        history: HistoryOptions::from(&config.history),
        tags: Vec::new(),
    };
    let context = AgentContext::get_or_create(backends, keys, &options)
        .with_context(|| format!("failed to open context for {}", format_keys(keys)))?;
    let count = context.chat_history.len();
    context.clear_history().context("failed to clear history")?;
    println!(
        "  {} Cleared {} messages and cached decisions from {}",
        "✓".green(),
        count,
        context.chat_history.id().cyan()
    );
    Ok(())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
