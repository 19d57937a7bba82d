//! Kestrel Core: types, configuration, chat history and storage boundaries.
//!
//! This crate contains:
//! - **types**: blocks, tags, roles and chat messages
//! - **config**: `~/.kestrel/config.json` schema and loader
//! - **history**: `ChatHistory`, its stores, search index, selectors and splitters
//! - **kv**: key/value stores behind the agent caches
//! - **backends**: the bundle of stores a context is resolved against

pub mod backends;
pub mod config;
pub mod error;
pub mod history;
pub mod kv;
pub mod types;
pub mod utils;

pub use backends::Backends;
pub use error::StoreError;
pub use history::{ChatHistory, HistoryOptions};
pub use kv::{KeyValueStore, KvProvider};
pub use types::{Block, ChatMessage, ContextKeys, Metadata, Role, Tag};
