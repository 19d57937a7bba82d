//! Utility helpers: path resolution, hashing, string manipulation.

use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::types::ContextKeys;

/// Get the Kestrel data directory (e.g. `~/.kestrel/`).
pub fn get_data_path() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".kestrel")
}

/// Directory holding chat history files under a data root.
pub fn histories_dir(root: &std::path::Path) -> PathBuf {
    root.join("histories")
}

/// Directory holding key/value cache stores under a data root.
pub fn caches_dir(root: &std::path::Path) -> PathBuf {
    root.join("caches")
}

/// Hex-encoded SHA-256 of a string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Stable store handle for a set of context keys, e.g. `llmcache-<sha256>`.
pub fn context_handle(prefix: &str, keys: &ContextKeys) -> String {
    // BTreeMap serializes in key order, so equal key sets give equal handles.
    let json = serde_json::to_string(keys).unwrap_or_default();
    format!("{prefix}-{}", sha256_hex(&json))
}

/// Truncate a string to `max_len` characters, adding "..." if truncated.
/// Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Sanitize a string for use as a filename.
pub fn safe_filename(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Expand `~` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(rest)
    } else if path == "~" {
        home_dir().unwrap_or_else(|| PathBuf::from("."))
    } else {
        PathBuf::from(path)
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}
