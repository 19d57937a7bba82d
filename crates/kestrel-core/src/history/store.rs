//! History persistence: the store behind [`ChatHistory`](super::ChatHistory).
//!
//! File format (JSONL) in `<data>/histories/{id}.jsonl`:
//! - Line 1: `{"_type":"metadata","id":"...","context_keys":{...},"index_handle":"...",...}`
//! - Line 2+: `{"id":"...","role":"user","text":"hello","timestamp":"..."}`

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::types::{ChatMessage, ContextKeys, Tag};
use crate::utils;

// ─────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────

/// A persisted chat history: identity, lookup keys and messages.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryRecord {
    pub id: String,
    pub context_keys: ContextKeys,
    pub tags: Vec<Tag>,
    /// Handle of the search index mirroring this history.
    pub index_handle: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl HistoryRecord {
    /// Create a new empty record with a fresh id.
    pub fn new(context_keys: ContextKeys, tags: Vec<Tag>, index_handle: impl Into<String>) -> Self {
        let now = Utc::now();
        HistoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            context_keys,
            tags,
            index_handle: index_handle.into(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    fn summary(&self) -> HistorySummary {
        HistorySummary {
            id: self.id.clone(),
            context_keys: self.context_keys.clone(),
            message_count: self.messages.len(),
            updated_at: self.updated_at,
        }
    }
}

/// Summary of a history for listing purposes.
#[derive(Clone, Debug)]
pub struct HistorySummary {
    pub id: String,
    pub context_keys: ContextKeys,
    pub message_count: usize,
    pub updated_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────
// Store trait
// ─────────────────────────────────────────────

/// Persistent storage for chat histories.
///
/// Lookup by context keys is an exact match on the full key/value set.
pub trait HistoryStore: Send + Sync {
    /// All records whose context keys equal `keys`.
    fn find(&self, keys: &ContextKeys) -> Result<Vec<HistoryRecord>>;

    /// Persist a new empty record.
    fn create(&self, record: HistoryRecord) -> Result<HistoryRecord>;

    /// Load a record by id.
    fn load(&self, id: &str) -> Result<HistoryRecord>;

    /// Append a message to the end of a history.
    fn append(&self, id: &str, message: &ChatMessage) -> Result<()>;

    /// Delete the messages with the given ids. Returns how many were removed.
    fn delete_messages(&self, id: &str, message_ids: &[String]) -> Result<usize>;

    /// Delete every message of a history (the record itself survives).
    fn clear(&self, id: &str) -> Result<()>;

    /// Summaries of all stored histories, newest first.
    fn list(&self) -> Result<Vec<HistorySummary>>;
}

fn remove_messages(record: &mut HistoryRecord, message_ids: &[String]) -> usize {
    let before = record.messages.len();
    record.messages.retain(|m| !message_ids.contains(&m.id));
    let removed = before - record.messages.len();
    if removed > 0 {
        record.updated_at = Utc::now();
    }
    removed
}

// ─────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────

/// Volatile store, for tests and ephemeral conversations.
#[derive(Default)]
pub struct MemoryHistoryStore {
    records: RwLock<HashMap<String, HistoryRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_record<T>(&self, id: &str, f: impl FnOnce(&mut HistoryRecord) -> T) -> Result<T> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::HistoryNotFound(id.to_string()))?;
        Ok(f(record))
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn find(&self, keys: &ContextKeys) -> Result<Vec<HistoryRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .values()
            .filter(|r| &r.context_keys == keys)
            .cloned()
            .collect())
    }

    fn create(&self, record: HistoryRecord) -> Result<HistoryRecord> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn load(&self, id: &str) -> Result<HistoryRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::HistoryNotFound(id.to_string()))
    }

    fn append(&self, id: &str, message: &ChatMessage) -> Result<()> {
        self.with_record(id, |record| {
            record.messages.push(message.clone());
            record.updated_at = Utc::now();
        })
    }

    fn delete_messages(&self, id: &str, message_ids: &[String]) -> Result<usize> {
        self.with_record(id, |record| remove_messages(record, message_ids))
    }

    fn clear(&self, id: &str) -> Result<()> {
        self.with_record(id, |record| {
            record.messages.clear();
            record.updated_at = Utc::now();
        })
    }

    fn list(&self) -> Result<Vec<HistorySummary>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut summaries: Vec<HistorySummary> = records.values().map(|r| r.summary()).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

// ─────────────────────────────────────────────
// JSONL file store
// ─────────────────────────────────────────────

/// Metadata header written as the first line of each JSONL history file.
#[derive(Debug, Serialize, Deserialize)]
struct HistoryMetadata {
    #[serde(rename = "_type")]
    record_type: String,
    id: String,
    context_keys: ContextKeys,
    #[serde(default)]
    tags: Vec<Tag>,
    index_handle: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Stores each history as a `.jsonl` file, with an in-memory cache.
///
/// Thread-safe via `RwLock`: multiple readers, exclusive writer.
pub struct JsonlHistoryStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, HistoryRecord>>,
}

impl JsonlHistoryStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        Ok(JsonlHistoryStore {
            dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", utils::safe_filename(id)))
    }

    /// Ids of every history file on disk.
    fn ids_on_disk(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)?.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "jsonl") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        Ok(ids)
    }

    fn read_metadata(&self, id: &str) -> Option<HistoryMetadata> {
        let file = std::fs::File::open(self.path_for(id)).ok()?;
        let line = std::io::BufReader::new(file).lines().next()?.ok()?;
        serde_json::from_str::<HistoryMetadata>(&line)
            .ok()
            .filter(|m| m.record_type == "metadata")
    }

    fn load_from_disk(&self, id: &str) -> Result<HistoryRecord> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(StoreError::HistoryNotFound(id.to_string()));
        }

        let reader = std::io::BufReader::new(std::fs::File::open(&path)?);
        let mut lines = reader.lines();

        let header = lines
            .next()
            .transpose()?
            .ok_or_else(|| StoreError::HistoryNotFound(id.to_string()))?;
        let meta: HistoryMetadata = serde_json::from_str(&header)?;

        let mut messages = Vec::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChatMessage>(&line) {
                Ok(msg) => messages.push(msg),
                Err(e) => warn!(history = %id, error = %e, "skipping unreadable message line"),
            }
        }

        debug!(history = %id, messages = messages.len(), "loaded history from disk");
        Ok(HistoryRecord {
            id: meta.id,
            context_keys: meta.context_keys,
            tags: meta.tags,
            index_handle: meta.index_handle,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            messages,
        })
    }

    /// Save a record to its JSONL file (overwrite).
    fn save_to_disk(&self, record: &HistoryRecord) -> Result<()> {
        let path = self.path_for(&record.id);
        let mut file = std::fs::File::create(&path)?;

        let meta = HistoryMetadata {
            record_type: "metadata".to_string(),
            id: record.id.clone(),
            context_keys: record.context_keys.clone(),
            tags: record.tags.clone(),
            index_handle: record.index_handle.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        };
        writeln!(file, "{}", serde_json::to_string(&meta)?)?;

        for msg in &record.messages {
            writeln!(file, "{}", serde_json::to_string(msg)?)?;
        }

        debug!(
            history = %record.id,
            messages = record.messages.len(),
            path = %path.display(),
            "saved history"
        );
        Ok(())
    }

    fn get(&self, id: &str) -> Result<HistoryRecord> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(record) = cache.get(id) {
                return Ok(record.clone());
            }
        }

        let record = self.load_from_disk(id)?;
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.insert(id.to_string(), record.clone());
        Ok(record)
    }

    /// Apply a change, persist it, then refresh the cache.
    fn modify<T>(&self, id: &str, f: impl FnOnce(&mut HistoryRecord) -> T) -> Result<T> {
        let mut record = self.get(id)?;
        let out = f(&mut record);
        self.save_to_disk(&record)?;

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.insert(id.to_string(), record);
        Ok(out)
    }
}

impl HistoryStore for JsonlHistoryStore {
    fn find(&self, keys: &ContextKeys) -> Result<Vec<HistoryRecord>> {
        let mut found = Vec::new();
        for id in self.ids_on_disk()? {
            let Some(meta) = self.read_metadata(&id) else {
                warn!(history = %id, "history file without readable metadata");
                continue;
            };
            if &meta.context_keys == keys {
                found.push(self.get(&id)?);
            }
        }
        Ok(found)
    }

    fn create(&self, record: HistoryRecord) -> Result<HistoryRecord> {
        self.save_to_disk(&record)?;
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn load(&self, id: &str) -> Result<HistoryRecord> {
        self.get(id)
    }

    fn append(&self, id: &str, message: &ChatMessage) -> Result<()> {
        self.modify(id, |record| {
            record.messages.push(message.clone());
            record.updated_at = Utc::now();
        })
    }

    fn delete_messages(&self, id: &str, message_ids: &[String]) -> Result<usize> {
        self.modify(id, |record| remove_messages(record, message_ids))
    }

    fn clear(&self, id: &str) -> Result<()> {
        self.modify(id, |record| {
            record.messages.clear();
            record.updated_at = Utc::now();
        })
    }

    fn list(&self) -> Result<Vec<HistorySummary>> {
        let mut summaries = Vec::new();
        for id in self.ids_on_disk()? {
            match self.get(&id) {
                Ok(record) => summaries.push(record.summary()),
                Err(e) => warn!(history = %id, error = %e, "failed to read history"),
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use tempfile::tempdir;

    fn keys(id: &str) -> ContextKeys {
        let mut keys = ContextKeys::new();
        keys.insert("id".into(), id.into());
        keys
    }

    fn exercise(store: &dyn HistoryStore) {
        let record = store.create(HistoryRecord::new(keys("a"), vec![], "idx-a")).unwrap();
        store.create(HistoryRecord::new(keys("b"), vec![], "idx-b")).unwrap();

        let hello = ChatMessage::from_text(Role::User, "hello");
        let hi = ChatMessage::from_text(Role::Assistant, "hi");
        store.append(&record.id, &hello).unwrap();
        store.append(&record.id, &hi).unwrap();

        let found = store.find(&keys("a")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].messages, vec![hello.clone(), hi.clone()]);
        assert_eq!(found[0].index_handle, "idx-a");

        let removed = store.delete_messages(&record.id, &[hello.id.clone()]).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.load(&record.id).unwrap().messages, vec![hi]);

        store.clear(&record.id).unwrap();
        assert!(store.load(&record.id).unwrap().messages.is_empty());

        assert_eq!(store.list().unwrap().len(), 2);
        assert!(matches!(store.load("missing"), Err(StoreError::HistoryNotFound(_))));
    }

    #[test]
    fn test_memory_store_operations() {
        exercise(&MemoryHistoryStore::new());
    }

    #[test]
    fn test_jsonl_store_operations() {
        let dir = tempdir().unwrap();
        exercise(&JsonlHistoryStore::new(dir.path()).unwrap());
    }

    #[test]
    fn test_find_requires_exact_key_match() {
        let store = MemoryHistoryStore::new();
        let mut wider = keys("a");
        wider.insert("channel".into(), "telegram".into());
        store.create(HistoryRecord::new(wider, vec![], "idx")).unwrap();

        assert!(store.find(&keys("a")).unwrap().is_empty());
    }

    #[test]
    fn test_jsonl_persistence_round_trip() {
        let dir = tempdir().unwrap();
        let id;
        {
            let store = JsonlHistoryStore::new(dir.path()).unwrap();
            let record = store.create(HistoryRecord::new(keys("42"), vec![], "idx")).unwrap();
            id = record.id.clone();
            store.append(&id, &ChatMessage::from_text(Role::System, "You are Kestrel.")).unwrap();
            store.append(&id, &ChatMessage::from_text(Role::User, "Hello")).unwrap();
        }

        // New store (empty cache) should load from disk
        let store = JsonlHistoryStore::new(dir.path()).unwrap();
        let found = store.find(&keys("42")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert_eq!(found[0].messages.len(), 2);
        assert_eq!(found[0].messages[1].role, Role::User);
    }

    #[test]
    fn test_jsonl_file_format() {
        let dir = tempdir().unwrap();
        let store = JsonlHistoryStore::new(dir.path()).unwrap();
        let record = store.create(HistoryRecord::new(keys("fmt"), vec![], "idx")).unwrap();
        store
            .append(&record.id, &ChatMessage::from_text(Role::User, "test message"))
            .unwrap();

        let path = dir.path().join(format!("{}.jsonl", record.id));
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.trim().lines().collect();
        assert_eq!(lines.len(), 2);

        let meta: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(meta["_type"], "metadata");
        assert_eq!(meta["context_keys"]["id"], "fmt");

        let msg: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(msg["role"], "user");
        assert_eq!(msg["text"], "test message");
    }
}
