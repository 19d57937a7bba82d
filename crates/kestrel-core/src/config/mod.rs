//! Configuration system: schema, loading, and env var overrides.
//!
//! # Usage
//! ```no_run
//! use kestrel_core::config;
//!
//! let cfg = config::load_config(None);
//! println!("Budget: {}", cfg.agent.max_actions_per_run);
//! ```

pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, save_config};
pub use schema::{AgentConfig, Config, HistoryConfig, StorageConfig, StreamingConfig};
