//! `kestrel cache`: inspect and clear the caches of a context.
//!
//! - `kestrel cache stats --key k=v`: entry counts
//! - `kestrel cache clear --key k=v [--actions-only | --llm-only]`: empty caches

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use kestrel_agent::{ActionCache, LlmCache};
use kestrel_core::types::ContextKeys;
use kestrel_core::Backends;

use crate::helpers::{format_keys, parse_keys, print_header};

/// Cache subcommands.
#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show how many entries each cache holds
    Stats {
        /// Context key, as name=value (repeatable)
        #[arg(long, required = true)]
        key: Vec<String>,
    },

    /// Clear the caches of a context
    Clear {
        /// Context key, as name=value (repeatable)
        #[arg(long, required = true)]
        key: Vec<String>,

        /// Only clear the action cache
        #[arg(long, default_value_t = false, conflicts_with = "llm_only")]
        actions_only: bool,

        /// Only clear the LLM cache
        #[arg(long, default_value_t = false)]
        llm_only: bool,
    },
}

/// Dispatch a cache subcommand.
pub fn dispatch(cmd: CacheCommands) -> Result<()> {
    let config = crate::config();
    let backends = crate::open_backends(&config)?;

    match cmd {
        CacheCommands::Stats { key } => stats(&backends, &parse_keys(&key)?),
        CacheCommands::Clear {
            key,
            actions_only,
            llm_only,
        } => clear(&backends, &parse_keys(&key)?, !llm_only, !actions_only),
    }
}

fn open(backends: &Backends, keys: &ContextKeys) -> Result<(ActionCache, LlmCache)> {
    let actions = ActionCache::open(backends.kv.as_ref(), keys).context("failed to open action cache")?;
    let llm = LlmCache::open(backends.kv.as_ref(), keys).context("failed to open LLM cache")?;
    Ok((actions, llm))
}

/// `kestrel cache stats`
fn stats(backends: &Backends, keys: &ContextKeys) -> Result<()> {
    let (actions, llm) = open(backends, keys)?;

    print_header(&format!("Caches for {}", format_keys(keys)));
    println!("  {:<14} {:>6}  {}", "Action cache:".bold(), actions.len()?, actions.handle().dimmed());
    println!("  {:<14} {:>6}  {}", "LLM cache:".bold(), llm.len()?, llm.handle().dimmed());
    println!();
    Ok(())
}

/// `kestrel cache clear`
fn clear(backends: &Backends, keys: &ContextKeys, actions: bool, llm: bool) -> Result<()> {
    let (action_cache, llm_cache) = open(backends, keys)?;
    if actions {
        action_cache.clear().context("failed to clear action cache")?;
        println!("  {} Cleared action cache {}", "✓".green(), action_cache.handle().cyan());
    }
    if llm {
        llm_cache.clear().context("failed to clear LLM cache")?;
        println!("  {} Cleared LLM cache {}", "✓".green(), llm_cache.handle().cyan());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_agent::Action;
    use kestrel_core::types::Block;

    #[test]
    fn test_clear_selected_caches() {
        let dir = tempfile::tempdir().unwrap();
        let backends = Backends::on_disk(dir.path()).unwrap();
        let keys = parse_keys(&["id=42".into()]).unwrap();

        let (actions, llm) = open(&backends, &keys).unwrap();
        let action = Action::new("Weather", vec![Block::text("SF")]);
        actions.update(&action, &[Block::text("fog")]).unwrap();
        llm.update(&[Block::text("SF?")], &action).unwrap();

        clear(&backends, &keys, true, false).unwrap();
        assert_eq!(actions.len().unwrap(), 0);
        assert_eq!(llm.len().unwrap(), 1);

        clear(&backends, &keys, true, true).unwrap();
        assert_eq!(llm.len().unwrap(), 0);
        assert!(stats(&backends, &keys).is_ok());
    }
}
