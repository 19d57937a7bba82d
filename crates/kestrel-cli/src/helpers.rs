//! Shared CLI helpers: path expansion, context key parsing, message printing.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;

use kestrel_core::types::{ChatMessage, ContextKeys, Role};
use kestrel_core::utils::truncate_string;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Parse repeated `--key name=value` arguments into context keys.
pub fn parse_keys(pairs: &[String]) -> Result<ContextKeys> {
    let mut keys = ContextKeys::new();
    for pair in pairs {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Invalid context key '{pair}' (expected name=value)"))?;
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("Invalid context key '{pair}' (empty name)");
        }
        keys.insert(name.to_string(), value.trim().to_string());
    }
    Ok(keys)
}

/// `a=1, b=2`
pub fn format_keys(keys: &ContextKeys) -> String {
    if keys.is_empty() {
        return "(no keys)".to_string();
    }
    keys.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn role_label(role: Role) -> String {
    let label = format!("{:<9}", role.as_str());
    match role {
        Role::User => label.green().bold().to_string(),
        Role::Assistant => label.cyan().bold().to_string(),
        Role::System => label.yellow().to_string(),
        Role::Agent | Role::Tool | Role::Llm => label.dimmed().to_string(),
    }
}

/// Print one chat message on a single line.
pub fn print_message(message: &ChatMessage) {
    let content = match (&message.text, &message.url) {
        (Some(text), _) => truncate_string(&text.replace('\n', " "), 120),
        (None, Some(url)) => format!("<{url}>"),
        (None, None) => format!("<{}>", message.mime_type.as_deref().unwrap_or("binary")),
    };
    println!(
        "  {} {} {}",
        message.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        role_label(message.role),
        content
    );
}

/// Print a section header.
pub fn print_header(title: &str) {
    println!();
    println!("{}", format!("  {title}").cyan().bold());
    println!();
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_home() {
        let result = expand_tilde("~/foo/bar");
        assert!(result.ends_with("foo/bar"));
        assert!(!result.starts_with("~"));
    }

    #[test]
    fn expand_tilde_no_tilde() {
        let result = expand_tilde("/absolute/path");
        assert_eq!(result, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn parse_keys_pairs() {
        let keys = parse_keys(&["id=42".into(), "channel = telegram".into()]).unwrap();
        assert_eq!(keys.get("id").map(String::as_str), Some("42"));
        assert_eq!(keys.get("channel").map(String::as_str), Some("telegram"));
    }

    #[test]
    fn parse_keys_value_may_contain_equals() {
        let keys = parse_keys(&["q=a=b".into()]).unwrap();
        assert_eq!(keys.get("q").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn parse_keys_rejects_malformed() {
        assert!(parse_keys(&["novalue".into()]).is_err());
        assert!(parse_keys(&["=x".into()]).is_err());
    }

    #[test]
    fn format_keys_sorted() {
        let keys = parse_keys(&["b=2".into(), "a=1".into()]).unwrap();
        assert_eq!(format_keys(&keys), "a=1, b=2");
        assert_eq!(format_keys(&ContextKeys::new()), "(no keys)");
    }
}
