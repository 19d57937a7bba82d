//! `kestrel status`: show configuration and storage status.

use anyhow::Result;
use colored::Colorize;

use kestrel_core::config::get_config_path;

fn on_off(flag: bool) -> String {
    if flag {
        "on".green().to_string()
    } else {
        "off".dimmed().to_string()
    }
}

/// Run the status command.
pub fn run() -> Result<()> {
    let config = crate::config();
    let config_path = get_config_path();

    println!();
    println!("{}", "Kestrel Status".cyan().bold());
    println!();

    // Config
    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".red().to_string()
        }
    );

    // Data dir
    let data_dir = crate::helpers::expand_tilde(&config.storage.data_dir);
    println!(
        "  {:<18} {} {}",
        "Data dir:".bold(),
        data_dir.display(),
        if data_dir.exists() {
            "✓".green().to_string()
        } else {
            "(not created yet)".dimmed().to_string()
        }
    );

    // Agent
    let agent = &config.agent;
    println!();
    println!("  {}", "Agent:".bold());
    println!("    {:<20} {}", "Max actions/run", agent.max_actions_per_run);
    println!("    {:<20} {}", "Action cache", on_off(agent.use_action_cache));
    println!("    {:<20} {}", "LLM cache", on_off(agent.use_llm_cache));
    println!(
        "    {:<20} agent {} | tool {} | llm {}",
        "Status messages",
        on_off(agent.streaming.include_agent_messages),
        on_off(agent.streaming.include_tool_messages),
        on_off(agent.streaming.include_llm_messages),
    );

    // History
    let history = &config.history;
    println!();
    println!("  {}", "History:".bold());
    println!("    {:<20} {}", "Searchable", on_off(history.searchable));
    println!("    {:<20} {}", "Chunk size", history.chunk_size);
    println!("    {:<20} {}", "Search results", history.search_k);

    // Stored histories
    if data_dir.exists() {
        let backends = crate::open_backends(&config)?;
        let count = backends.histories.list().map(|l| l.len()).unwrap_or(0);
        println!("    {:<20} {}", "Stored histories", count);
    }

    println!();
    Ok(())
}
