//! Key/value stores backing the action and LLM caches.
//!
//! Each store is addressed by a handle (e.g. `actioncache-<sha256>`). Values
//! are JSON; entries never expire.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::utils;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Insert or overwrite.
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove one entry. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every entry.
    fn reset(&self) -> Result<()>;

    fn len(&self) -> Result<usize>;
}

/// Opens stores by handle. Opening the same handle twice yields the same store.
pub trait KvProvider: Send + Sync {
    fn open(&self, handle: &str) -> Result<Arc<dyn KeyValueStore>>;
}

// ─────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.remove(key).is_some())
    }

    fn reset(&self) -> Result<()> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries.read().unwrap_or_else(PoisonError::into_inner).len())
    }
}

#[derive(Default)]
pub struct MemoryKvProvider {
    stores: RwLock<HashMap<String, Arc<MemoryKvStore>>>,
}

impl MemoryKvProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvProvider for MemoryKvProvider {
    fn open(&self, handle: &str) -> Result<Arc<dyn KeyValueStore>> {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        let store: Arc<dyn KeyValueStore> = stores
            .entry(handle.to_string())
            .or_insert_with(|| Arc::new(MemoryKvStore::new()))
            .clone();
        Ok(store)
    }
}

// ─────────────────────────────────────────────
// JSON file
// ─────────────────────────────────────────────

/// A store persisted as one JSON object per file.
///
/// Entries are held in memory; every write rewrites the file through a
/// temporary sibling and a rename.
pub struct JsonKvStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, Value>>,
}

impl JsonKvStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// An unreadable file is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<HashMap<String, Value>>(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable cache file, starting empty");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "opened cache store");
        Ok(JsonKvStore {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonKvStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut updated = entries.clone();
        updated.insert(key.to_string(), value);
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !entries.contains_key(key) {
            return Ok(false);
        }
        let mut updated = entries.clone();
        updated.remove(key);
        self.persist(&updated)?;
        *entries = updated;
        Ok(true)
    }

    fn reset(&self) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        entries.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries.read().unwrap_or_else(PoisonError::into_inner).len())
    }
}

/// One [`JsonKvStore`] per handle under a directory.
pub struct JsonKvProvider {
    dir: PathBuf,
    stores: RwLock<HashMap<String, Arc<JsonKvStore>>>,
}

impl JsonKvProvider {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(JsonKvProvider {
            dir,
            stores: RwLock::new(HashMap::new()),
        })
    }
}

impl KvProvider for JsonKvProvider {
    fn open(&self, handle: &str) -> Result<Arc<dyn KeyValueStore>> {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = stores.get(handle) {
            let store: Arc<dyn KeyValueStore> = store.clone();
            return Ok(store);
        }
        let path = self.dir.join(format!("{}.json", utils::safe_filename(handle)));
        let store = Arc::new(JsonKvStore::open(path)?);
        stores.insert(handle.to_string(), store.clone());
        Ok(store)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
