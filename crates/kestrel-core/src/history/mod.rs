//! Chat history: persisted conversations keyed by context keys, with an
//! optional search index.
//!
//! # Layers
//! - [`ChatHistory`]: the conversation API used by agents and tools
//! - [`HistoryStore`]: where messages live (JSONL files or memory)
//! - [`SearchIndex`]: chunk index for similarity search
//! - [`MessageSelector`] / [`TextSplitter`]: message selection and chunking

pub mod chat_history;
pub mod index;
pub mod selectors;
pub mod splitter;
pub mod store;

pub use chat_history::{ChatHistory, HistoryOptions};
pub use index::{IndexProvider, MemoryIndex, MemoryIndexProvider, SearchHit, SearchIndex};
pub use selectors::{
    AllMessages, IdSelector, MessageSelector, MessageWindowSelector, NoMessages, RoleSelector,
    TokenWindowSelector,
};
pub use splitter::{FixedSizeTextSplitter, TextSplitter};
pub use store::{HistoryRecord, HistoryStore, HistorySummary, JsonlHistoryStore, MemoryHistoryStore};
