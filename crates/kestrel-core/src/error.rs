//! Error types for the storage boundaries (history store, search index,
//! key/value store).

use thiserror::Error;

/// Errors raised by chat history, index and cache storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// More than one persisted history matched a context key lookup.
    #[error("{count} chat histories match these context keys; expected at most one")]
    Ambiguous { count: usize },

    #[error("Chat history not found: {0}")]
    HistoryNotFound(String),

    #[error("This chat history has no search index and is not searchable")]
    NotSearchable,

    #[error("Search index error: {0}")]
    Index(String),
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
