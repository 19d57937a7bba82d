//! Configuration schema.
//!
//! Hierarchy: `Config` → `AgentConfig` (+ `StreamingConfig`), `HistoryConfig`,
//! `StorageConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration: loaded from `~/.kestrel/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agent: AgentConfig,
    pub history: HistoryConfig,
    pub storage: StorageConfig,
}

// ─────────────────────────────────────────────
// Agent execution
// ─────────────────────────────────────────────

/// Settings for the agent executor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Maximum non-final actions executed in one run before it fails.
    pub max_actions_per_run: usize,
    /// Memoize policy decisions per context.
    pub use_llm_cache: bool,
    /// Memoize tool results per context.
    pub use_action_cache: bool,
    /// Which status messages are written to the chat history during a run.
    pub streaming: StreamingConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_actions_per_run: 5,
            use_llm_cache: false,
            use_action_cache: false,
            streaming: StreamingConfig::default(),
        }
    }
}

/// Status message streaming into the chat history.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamingConfig {
    pub include_agent_messages: bool,
    pub include_tool_messages: bool,
    pub include_llm_messages: bool,
}

// ─────────────────────────────────────────────
// Chat history
// ─────────────────────────────────────────────

/// Chat history settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryConfig {
    /// Mirror messages into a search index.
    pub searchable: bool,
    /// Characters per indexed chunk.
    pub chunk_size: usize,
    /// Default number of search results.
    pub search_k: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            searchable: true,
            chunk_size: 300,
            search_k: 5,
        }
    }
}

// ─────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────

/// Where histories and caches are persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// Data directory (`~` is expanded).
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.kestrel".to_string(),
        }
    }
}

impl StorageConfig {
    /// The data directory with `~` expanded.
    pub fn data_path(&self) -> std::path::PathBuf {
        crate::utils::expand_home(&self.data_dir)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.agent.max_actions_per_run, 5);
        assert!(!config.agent.use_llm_cache);
        assert!(!config.agent.use_action_cache);
        assert!(config.history.searchable);
        assert_eq!(config.history.chunk_size, 300);
        assert_eq!(config.storage.data_dir, "~/.kestrel");
    }

    #[test]
    fn test_camel_case_round_trip() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(json["agent"].get("maxActionsPerRun").is_some());
        assert!(json["agent"]["streaming"].get("includeToolMessages").is_some());
        assert!(json["history"].get("chunkSize").is_some());

        let back: Config = serde_json::from_value(json).unwrap();
        assert_eq!(back.history.search_k, 5);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"agent": {"useLlmCache": true}}"#).unwrap();
        assert!(config.agent.use_llm_cache);
        assert_eq!(config.agent.max_actions_per_run, 5);
        assert_eq!(config.agent.streaming, StreamingConfig::default());
    }
}
