//! The storage services an agent context is resolved against.

use std::path::Path;
use std::sync::Arc;

use crate::history::{IndexProvider, HistoryStore, JsonlHistoryStore, MemoryHistoryStore, MemoryIndexProvider};
use crate::kv::{JsonKvProvider, KvProvider, MemoryKvProvider};
use crate::utils;

/// History store, search indexes and cache stores, shared by every context.
#[derive(Clone)]
pub struct Backends {
    pub histories: Arc<dyn HistoryStore>,
    pub indexes: Arc<dyn IndexProvider>,
    pub kv: Arc<dyn KvProvider>,
}

impl Backends {
    /// Everything in memory; nothing survives the process.
    pub fn in_memory() -> Self {
        Backends {
            histories: Arc::new(MemoryHistoryStore::new()),
            indexes: Arc::new(MemoryIndexProvider::new()),
            kv: Arc::new(MemoryKvProvider::new()),
        }
    }

    /// Histories under `<root>/histories`, caches under `<root>/caches`.
    ///
    /// Search indexes are held in memory and rebuilt from stored chunks when
    /// a history is opened.
    pub fn on_disk(root: &Path) -> std::io::Result<Self> {
        Ok(Backends {
            histories: Arc::new(JsonlHistoryStore::new(utils::histories_dir(root))?),
            indexes: Arc::new(MemoryIndexProvider::new()),
            kv: Arc::new(JsonKvProvider::new(utils::caches_dir(root))?),
        })
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}
