//! Kestrel CLI: entry point.
//!
//! Local inspection of the data Kestrel agents persist.
//!
//! # Commands
//!
//! - `kestrel status`: show configuration and storage status
//! - `kestrel history ...`: list, show, search, append to and clear chat histories
//! - `kestrel cache ...`: inspect and clear the action and LLM caches of a context

mod cache_cmd;
mod helpers;
mod history_cmd;
mod status;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use kestrel_core::config::{load_config, Config};
use kestrel_core::Backends;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Kestrel: agent execution core with persistent chat histories
#[derive(Parser)]
#[command(name = "kestrel", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true, default_value_t = false)]
    logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show configuration and storage status
    Status,

    /// Inspect and edit chat histories
    History {
        #[command(subcommand)]
        action: history_cmd::HistoryCommands,
    },

    /// Inspect and clear agent caches
    Cache {
        #[command(subcommand)]
        action: cache_cmd::CacheCommands,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.logs);

    match cli.command {
        Commands::Status => status::run(),
        Commands::History { action } => history_cmd::dispatch(action),
        Commands::Cache { action } => cache_cmd::dispatch(action),
    }
}

/// Open the on-disk backends under the configured data directory.
pub fn open_backends(config: &Config) -> Result<Backends> {
    let root = helpers::expand_tilde(&config.storage.data_dir);
    tracing::debug!(root = %root.display(), "Opening backends");
    Backends::on_disk(&root)
        .with_context(|| format!("failed to open data directory: {}", root.display()))
}

/// Load the config file (plus env overrides).
pub fn config() -> Config {
    load_config(None)
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("kestrel=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
