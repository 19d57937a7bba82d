//! Config loader: reads `~/.kestrel/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.kestrel/config.json`
//! 3. Environment variables `KESTREL_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Supported overrides:
/// - `KESTREL_AGENT__MAX_ACTIONS_PER_RUN` → `agent.max_actions_per_run`
/// - `KESTREL_AGENT__USE_LLM_CACHE` → `agent.use_llm_cache`
/// - `KESTREL_AGENT__USE_ACTION_CACHE` → `agent.use_action_cache`
/// - `KESTREL_HISTORY__SEARCHABLE` → `history.searchable`
/// - `KESTREL_HISTORY__CHUNK_SIZE` → `history.chunk_size`
/// - `KESTREL_STORAGE__DATA_DIR` → `storage.data_dir`
fn apply_env_overrides(config: Config) -> Config {
    apply_overrides(config, |name| std::env::var(name).ok())
}

fn apply_overrides(mut config: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(val) = var("KESTREL_AGENT__MAX_ACTIONS_PER_RUN") {
        match val.parse::<usize>() {
            Ok(n) => config.agent.max_actions_per_run = n,
            Err(_) => warn!("Ignoring invalid KESTREL_AGENT__MAX_ACTIONS_PER_RUN: {}", val),
        }
    }
    if let Some(val) = var("KESTREL_AGENT__USE_LLM_CACHE") {
        config.agent.use_llm_cache = parse_flag(&val);
    }
    if let Some(val) = var("KESTREL_AGENT__USE_ACTION_CACHE") {
        config.agent.use_action_cache = parse_flag(&val);
    }
    if let Some(val) = var("KESTREL_HISTORY__SEARCHABLE") {
        config.history.searchable = parse_flag(&val);
    }
    if let Some(val) = var("KESTREL_HISTORY__CHUNK_SIZE") {
        match val.parse::<usize>() {
            Ok(n) if n > 0 => config.history.chunk_size = n,
            _ => warn!("Ignoring invalid KESTREL_HISTORY__CHUNK_SIZE: {}", val),
        }
    }
    if let Some(val) = var("KESTREL_STORAGE__DATA_DIR") {
        config.storage.data_dir = val;
    }

    config
}

fn parse_flag(val: &str) -> bool {
    val == "true" || val == "1"
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_missing_file() {
        let config = load_config_from_path(Path::new("/nonexistent/path/config.json"));
        assert_eq!(config.history.chunk_size, 300);
    }

    #[test]
    fn test_load_valid_json() {
        let file = write_temp_json(
            r#"{
            "agent": {
                "maxActionsPerRun": 9,
                "useActionCache": true,
                "streaming": { "includeToolMessages": true }
            },
            "history": { "chunkSize": 120 }
        }"#,
        );

        let config = load_config_from_path(file.path());
        assert_eq!(config.agent.max_actions_per_run, 9);
        assert!(config.agent.use_action_cache);
        assert!(config.agent.streaming.include_tool_messages);
        assert!(!config.agent.streaming.include_agent_messages);
        assert_eq!(config.history.chunk_size, 120);
        // Default preserved
        assert!(config.history.searchable);
    }

    #[test]
    fn test_load_invalid_json_returns_defaults() {
        let file = write_temp_json("not valid json {{{");
        let config = load_config_from_path(file.path());
        assert_eq!(config.history.chunk_size, 300);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.agent.use_llm_cache = true;
        config.storage.data_dir = "/tmp/kestrel-data".to_string();

        save_config(&config, Some(&path)).unwrap();

        let reloaded = load_config_from_path(&path);
        assert!(reloaded.agent.use_llm_cache);
        assert_eq!(reloaded.storage.data_dir, "/tmp/kestrel-data");
    }

    fn vars<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_override_chunk_size() {
        let config = apply_overrides(Config::default(), vars(&[("KESTREL_HISTORY__CHUNK_SIZE", "64")]));
        assert_eq!(config.history.chunk_size, 64);

        let config = apply_overrides(Config::default(), vars(&[("KESTREL_HISTORY__CHUNK_SIZE", "0")]));
        assert_eq!(config.history.chunk_size, 300);
    }

    #[test]
    fn test_override_cache_flags() {
        let config = apply_overrides(
            Config::default(),
            vars(&[
                ("KESTREL_AGENT__USE_LLM_CACHE", "1"),
                ("KESTREL_AGENT__USE_ACTION_CACHE", "true"),
                ("KESTREL_HISTORY__SEARCHABLE", "no"),
            ]),
        );
        assert!(config.agent.use_llm_cache);
        assert!(config.agent.use_action_cache);
        assert!(!config.history.searchable);
    }

    #[test]
    fn test_override_budget() {
        let config = apply_overrides(Config::default(), vars(&[("KESTREL_AGENT__MAX_ACTIONS_PER_RUN", "12")]));
        assert_eq!(config.agent.max_actions_per_run, 12);
    }

    #[test]
    fn test_saved_json_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        save_config(&Config::default(), Some(&path)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&content).unwrap();

        assert!(raw["agent"].get("maxActionsPerRun").is_some());
        assert!(raw["agent"].get("max_actions_per_run").is_none());
    }
}
