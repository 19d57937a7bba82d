//! Action and LLM caches: per-context memoization of tool results and
//! policy decisions.
//!
//! Both sit on a [`KeyValueStore`] opened under a handle derived from the
//! context keys. Lookups never fail: store or decode errors are logged and
//! reported as a miss. Writes return the store error to the caller.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use kestrel_core::error::Result as StoreResult;
use kestrel_core::kv::{KeyValueStore, KvProvider};
use kestrel_core::types::{Block, ContextKeys};
use kestrel_core::utils::context_handle;

use crate::action::{blocks_key, Action};

const ACTION_CACHE_PREFIX: &str = "actioncache";
const LLM_CACHE_PREFIX: &str = "llmcache";

fn read<T: DeserializeOwned>(store: &dyn KeyValueStore, handle: &str, key: &str) -> Option<T> {
    let value = match store.get(key) {
        Ok(Some(value)) => value,
        Ok(None) => return None,
        Err(e) => {
            warn!(cache = %handle, error = %e, "cache read failed, treating as miss");
            return None;
        }
    };
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(cache = %handle, error = %e, "undecodable cache entry, treating as miss");
            None
        }
    }
}

// ─────────────────────────────────────────────
// Action cache
// ─────────────────────────────────────────────

/// Tool output keyed by action (tool name + input).
#[derive(Clone)]
pub struct ActionCache {
    handle: String,
    store: Arc<dyn KeyValueStore>,
}

impl ActionCache {
    pub fn new(handle: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            handle: handle.into(),
            store,
        }
    }

    /// The action cache of a context, `actioncache-<sha256(keys)>`.
    pub fn open(provider: &dyn KvProvider, context_keys: &ContextKeys) -> StoreResult<Self> {
        let handle = context_handle(ACTION_CACHE_PREFIX, context_keys);
        let store = provider.open(&handle)?;
        Ok(Self::new(handle, store))
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn lookup(&self, action: &Action) -> Option<Vec<Block>> {
        let hit = read(self.store.as_ref(), &self.handle, &action.cache_key());
        debug!(cache = %self.handle, tool = %action.tool, hit = hit.is_some(), "action cache lookup");
        hit
    }

    /// Insert or overwrite the output for `action`.
    pub fn update(&self, action: &Action, output: &[Block]) -> StoreResult<()> {
        self.store
            .set(&action.cache_key(), serde_json::to_value(output)?)
    }

    pub fn delete(&self, action: &Action) -> StoreResult<bool> {
        self.store.delete(&action.cache_key())
    }

    pub fn clear(&self) -> StoreResult<()> {
        self.store.reset()
    }

    pub fn len(&self) -> StoreResult<usize> {
        self.store.len()
    }
}

impl std::fmt::Debug for ActionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionCache").field("handle", &self.handle).finish()
    }
}

// ─────────────────────────────────────────────
// LLM cache
// ─────────────────────────────────────────────

/// Policy decisions keyed by the input blocks they were made for.
///
/// The key does not include the agent, its tool set or the rest of the
/// conversation.
#[derive(Clone)]
pub struct LlmCache {
    handle: String,
    store: Arc<dyn KeyValueStore>,
}

impl LlmCache {
    pub fn new(handle: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            handle: handle.into(),
            store,
        }
    }

    /// The LLM cache of a context, `llmcache-<sha256(keys)>`.
    pub fn open(provider: &dyn KvProvider, context_keys: &ContextKeys) -> StoreResult<Self> {
        let handle = context_handle(LLM_CACHE_PREFIX, context_keys);
        let store = provider.open(&handle)?;
        Ok(Self::new(handle, store))
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn lookup(&self, input: &[Block]) -> Option<Action> {
        let hit: Option<Action> = read(self.store.as_ref(), &self.handle, &blocks_key(input));
        debug!(cache = %self.handle, hit = hit.is_some(), "llm cache lookup");
        hit
    }

    pub fn update(&self, input: &[Block], action: &Action) -> StoreResult<()> {
        self.store.set(&blocks_key(input), serde_json::to_value(action)?)
    }

    pub fn delete(&self, input: &[Block]) -> StoreResult<bool> {
        self.store.delete(&blocks_key(input))
    }

    pub fn clear(&self) -> StoreResult<()> {
        self.store.reset()
    }

    pub fn len(&self) -> StoreResult<usize> {
        self.store.len()
    }
}

impl std::fmt::Debug for LlmCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmCache").field("handle", &self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::kv::{JsonKvProvider, MemoryKvProvider};
    use serde_json::json;

    fn keys() -> ContextKeys {
        let mut keys = ContextKeys::new();
        keys.insert("id".into(), "42".into());
        keys
    }

    #[test]
    fn test_action_cache_round_trip() {
        let cache = ActionCache::open(&MemoryKvProvider::new(), &keys()).unwrap();
        let action = Action::new("Weather", vec![Block::text("weather in SF")]);
        assert!(cache.lookup(&action).is_none());

        let output = vec![Block::text("cloudy")];
        cache.update(&action, &output).unwrap();
        assert_eq!(cache.lookup(&action), Some(output));

        // Idempotent upsert
        cache.update(&action, &[Block::text("sunny")]).unwrap();
        assert_eq!(cache.lookup(&action), Some(vec![Block::text("sunny")]));
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_action_cache_delete_and_clear() {
        let cache = ActionCache::open(&MemoryKvProvider::new(), &keys()).unwrap();
        let a = Action::new("A", vec![]);
        let b = Action::new("B", vec![]);
        cache.update(&a, &[Block::text("1")]).unwrap();
        cache.update(&b, &[Block::text("2")]).unwrap();

        assert!(cache.delete(&a).unwrap());
        assert!(cache.lookup(&a).is_none());
        assert!(cache.lookup(&b).is_some());

        cache.clear().unwrap();
        assert!(cache.lookup(&b).is_none());
    }

    #[test]
    fn test_llm_cache_round_trip() {
        let cache = LlmCache::open(&MemoryKvProvider::new(), &keys()).unwrap();
        let input = vec![Block::text("weather in SF")];
        let action = Action::new("Weather", input.clone());

        cache.update(&input, &action).unwrap();
        assert_eq!(cache.lookup(&input), Some(action));
        assert!(cache.lookup(&[Block::text("weather in LA")]).is_none());

        assert!(cache.delete(&input).unwrap());
        assert!(cache.lookup(&input).is_none());
    }

    #[test]
    fn test_handles_are_per_context_and_kind() {
        let provider = MemoryKvProvider::new();
        let actions = ActionCache::open(&provider, &keys()).unwrap();
        let llm = LlmCache::open(&provider, &keys()).unwrap();
        assert!(actions.handle().starts_with("actioncache-"));
        assert!(llm.handle().starts_with("llmcache-"));

        let mut other = keys();
        other.insert("id".into(), "43".into());
        assert_ne!(actions.handle(), ActionCache::open(&provider, &other).unwrap().handle());
    }

    #[test]
    fn test_undecodable_entry_is_miss() {
        let provider = MemoryKvProvider::new();
        let cache = LlmCache::open(&provider, &keys()).unwrap();
        let input = vec![Block::text("x")];
        provider
            .open(cache.handle())
            .unwrap()
            .set(&blocks_key(&input), json!("not an action"))
            .unwrap();
        assert!(cache.lookup(&input).is_none());
    }

    #[test]
    fn test_caches_persist_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let action = Action::new("Weather", vec![Block::text("SF")]);
        {
            let provider = JsonKvProvider::new(dir.path()).unwrap();
            let cache = ActionCache::open(&provider, &keys()).unwrap();
            cache.update(&action, &[Block::text("fog")]).unwrap();
        }
        let provider = JsonKvProvider::new(dir.path()).unwrap();
        let cache = ActionCache::open(&provider, &keys()).unwrap();
        assert_eq!(cache.lookup(&action), Some(vec![Block::text("fog")]));
    }
}
