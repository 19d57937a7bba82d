//! ChatHistory: an ordered, persisted conversation with an optional search
//! index over its non-status messages.
//!
//! A history is identified by its context keys: exactly one persisted history
//! may exist per key set. Appends go to the [`HistoryStore`] first and are then
//! chunked into the [`SearchIndex`]. The two steps are not atomic: if indexing
//! fails the message stays persisted but unsearchable. Reopening the history
//! with an empty index rebuilds it from the chunk tags stored on the messages.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use tracing::{debug, info, warn};

use super::index::{IndexProvider, SearchHit, SearchIndex};
use super::selectors::MessageSelector;
use super::splitter::{FixedSizeTextSplitter, TextSplitter, DEFAULT_CHUNK_SIZE};
use super::store::{HistoryRecord, HistoryStore};
use crate::config::HistoryConfig;
use crate::error::{Result, StoreError};
use crate::types::{tags, Block, ChatMessage, ContextKeys, Role, Tag};

/// How a history is opened.
#[derive(Clone, Debug)]
pub struct HistoryOptions {
    /// Attach a search index and chunk messages into it.
    pub searchable: bool,
    /// Characters per indexed chunk.
    pub chunk_size: usize,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            searchable: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl From<&HistoryConfig> for HistoryOptions {
    fn from(config: &HistoryConfig) -> Self {
        Self {
            searchable: config.searchable,
            chunk_size: config.chunk_size,
        }
    }
}

pub struct ChatHistory {
    store: Arc<dyn HistoryStore>,
    index: Option<Arc<dyn SearchIndex>>,
    splitter: Box<dyn TextSplitter>,
    record: RwLock<HistoryRecord>,
}

impl std::fmt::Debug for ChatHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let record = self.record();
        f.debug_struct("ChatHistory")
            .field("id", &record.id)
            .field("context_keys", &record.context_keys)
            .field("messages", &record.messages.len())
            .field("searchable", &self.is_searchable())
            .finish()
    }
}

impl ChatHistory {
    /// Find the history for `context_keys`, creating it if none exists.
    ///
    /// Fails with [`StoreError::Ambiguous`] when several histories match.
    pub fn get_or_create(
        store: Arc<dyn HistoryStore>,
        indexes: &dyn IndexProvider,
        context_keys: &ContextKeys,
        tags: Vec<Tag>,
        options: &HistoryOptions,
    ) -> Result<Self> {
        let mut found = store.find(context_keys)?;
        let record = match found.len() {
            0 => {
                let handle = uuid::Uuid::new_v4().to_string();
                let record = store.create(HistoryRecord::new(context_keys.clone(), tags, handle))?;
                info!(history = %record.id, keys = ?context_keys, "created chat history");
                record
            }
            1 => found.remove(0),
            count => return Err(StoreError::Ambiguous { count }),
        };

        let index = if options.searchable {
            Some(indexes.open(&record.index_handle)?)
        } else {
            None
        };

        let history = ChatHistory {
            store,
            index,
            splitter: Box::new(FixedSizeTextSplitter::new(options.chunk_size)),
            record: RwLock::new(record),
        };
        history.heal_index()?;
        Ok(history)
    }

    /// Use a different splitter for subsequent appends.
    pub fn with_splitter(mut self, splitter: Box<dyn TextSplitter>) -> Self {
        self.splitter = splitter;
        self
    }

    fn record(&self) -> RwLockReadGuard<'_, HistoryRecord> {
        self.record.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> String {
        self.record().id.clone()
    }

    pub fn context_keys(&self) -> ContextKeys {
        self.record().context_keys.clone()
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.record().tags.clone()
    }

    pub fn index_handle(&self) -> String {
        self.record().index_handle.clone()
    }

    pub fn is_searchable(&self) -> bool {
        self.index.is_some()
    }

    // ─────────────────────────────────────────────
    // Appending
    // ─────────────────────────────────────────────

    /// Append a text message.
    pub fn append_message_with_role(
        &self,
        text: impl Into<String>,
        role: Role,
        tags: Vec<Tag>,
    ) -> Result<ChatMessage> {
        let mut block = Block::text(text);
        block.tags = tags;
        self.append_block(block, role)
    }

    /// Append a block (text or binary reference) as a message.
    ///
    /// Non-status text messages of a searchable history are chunked; the chunk
    /// tags are stored on the message and inserted into the index. Role,
    /// message and chunk tags already on `block` (for example from
    /// [`ChatMessage::to_block`]) are replaced by this message's own.
    pub fn append_block(&self, mut block: Block, role: Role) -> Result<ChatMessage> {
        block.tags.retain(|t| t.kind != tags::KIND_CHAT);
        let chunk = self.index.is_some() && !role.is_status() && block.is_text();
        let mut message = ChatMessage::new(role, block);
        message.tags.push(Tag {
            value: Some(serde_json::Value::String(role.as_str().to_string())),
            ..Tag::new(tags::KIND_CHAT, tags::NAME_ROLE)
        });
        message.tags.push(Tag::new(tags::KIND_CHAT, tags::NAME_MESSAGE));

        let chunks = match message.text.as_deref() {
            Some(text) if chunk => self.splitter.chunk_tags(&message.id, text),
            _ => Vec::new(),
        };
        message.tags.extend(chunks.iter().cloned());

        let history_id = self.id();
        self.store.append(&history_id, &message)?;
        {
            let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
            record.messages.push(message.clone());
            record.updated_at = message.timestamp;
        }

        if let (Some(index), false) = (&self.index, chunks.is_empty()) {
            if let Err(e) = index.insert(&chunks) {
                warn!(
                    history = %history_id,
                    message = %message.id,
                    error = %e,
                    "message persisted but not indexed"
                );
                return Err(e);
            }
        }

        debug!(history = %history_id, role = %role, chunks = chunks.len(), "appended message");
        Ok(message)
    }

    pub fn append_user_message(&self, text: impl Into<String>) -> Result<ChatMessage> {
        self.append_message_with_role(text, Role::User, Vec::new())
    }

    pub fn append_system_message(&self, text: impl Into<String>) -> Result<ChatMessage> {
        self.append_message_with_role(text, Role::System, Vec::new())
    }

    pub fn append_assistant_message(&self, text: impl Into<String>) -> Result<ChatMessage> {
        self.append_message_with_role(text, Role::Assistant, Vec::new())
    }

    /// Status update from the agent. Never indexed.
    pub fn append_agent_message(&self, text: impl Into<String>) -> Result<ChatMessage> {
        self.append_message_with_role(text, Role::Agent, Vec::new())
    }

    /// Status update from a tool. Never indexed.
    pub fn append_tool_message(&self, text: impl Into<String>) -> Result<ChatMessage> {
        self.append_message_with_role(text, Role::Tool, Vec::new())
    }

    /// Status update about a policy (LLM) call. Never indexed.
    pub fn append_llm_message(&self, text: impl Into<String>) -> Result<ChatMessage> {
        self.append_message_with_role(text, Role::Llm, Vec::new())
    }

    // ─────────────────────────────────────────────
    // Reading
    // ─────────────────────────────────────────────

    /// All messages, in insertion order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.record().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.record().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn select_messages(&self, selector: &dyn MessageSelector) -> Vec<ChatMessage> {
        selector.select(&self.record().messages)
    }

    fn last_with_role(&self, role: Role) -> Option<ChatMessage> {
        self.record()
            .messages
            .iter()
            .rev()
            .find(|m| m.role == role)
            .cloned()
    }

    pub fn last_user_message(&self) -> Option<ChatMessage> {
        self.last_with_role(Role::User)
    }

    pub fn last_system_message(&self) -> Option<ChatMessage> {
        self.last_with_role(Role::System)
    }

    /// Most recent assistant reply.
    pub fn last_agent_message(&self) -> Option<ChatMessage> {
        self.last_with_role(Role::Assistant)
    }

    /// The first message, if it is a system message.
    pub fn initial_system_prompt(&self) -> Option<ChatMessage> {
        self.record()
            .messages
            .first()
            .filter(|m| m.role == Role::System)
            .cloned()
    }

    /// Up to `k` indexed chunks most similar to `text`.
    pub fn search(&self, text: &str, k: usize) -> Result<Vec<SearchHit>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let index = self.index.as_ref().ok_or(StoreError::NotSearchable)?;
        index.search(text, k)
    }

    // ─────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────

    /// Reload messages from the store.
    pub fn refresh(&self) -> Result<()> {
        let id = self.id();
        let fresh = self.store.load(&id)?;
        *self.record.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        Ok(())
    }

    /// Delete the selected messages and rebuild the index from the survivors.
    pub fn delete_messages(&self, selector: &dyn MessageSelector) -> Result<usize> {
        let ids: Vec<String> = self
            .select_messages(selector)
            .into_iter()
            .map(|m| m.id)
            .collect();
        let id = self.id();
        let removed = if ids.is_empty() {
            0
        } else {
            self.store.delete_messages(&id, &ids)?
        };
        self.refresh()?;
        if self.index.is_some() {
            self.rebuild_index()?;
        }
        debug!(history = %id, removed, "deleted messages");
        Ok(removed)
    }

    /// Delete every message (system prompts included) and empty the index.
    pub fn clear(&self) -> Result<()> {
        let id = self.id();
        self.store.clear(&id)?;
        if let Some(index) = &self.index {
            index.reset()?;
        }
        self.refresh()?;
        info!(history = %id, "cleared chat history");
        Ok(())
    }

    // ─────────────────────────────────────────────
    // Index maintenance
    // ─────────────────────────────────────────────

    /// Chunk tags of every stored message, with missing chunk text restored
    /// from the message text.
    fn stored_chunks(&self) -> Vec<Tag> {
        let record = self.record();
        let mut chunks = Vec::new();
        for message in &record.messages {
            for tag in message.chunk_tags() {
                let mut tag = tag.clone();
                if tag.text.is_none() {
                    tag.text = chunk_text(message, &tag);
                }
                if tag.block_id.is_none() {
                    tag.block_id = Some(message.id.clone());
                }
                chunks.push(tag);
            }
        }
        chunks
    }

    fn rebuild_index(&self) -> Result<()> {
        let Some(index) = &self.index else {
            return Ok(());
        };
        let chunks = self.stored_chunks();
        index.reset()?;
        index.insert(&chunks)?;
        debug!(history = %self.id(), chunks = chunks.len(), "rebuilt search index");
        Ok(())
    }

    fn heal_index(&self) -> Result<()> {
        match &self.index {
            Some(index) if index.is_empty() && !self.stored_chunks().is_empty() => {
                info!(history = %self.id(), "search index empty, rebuilding from stored chunks");
                self.rebuild_index()
            }
            _ => Ok(()),
        }
    }
}

fn chunk_text(message: &ChatMessage, tag: &Tag) -> Option<String> {
    let text = message.text.as_deref()?;
    let start = tag.start_idx.unwrap_or(0);
    let end = tag.end_idx.unwrap_or(usize::MAX);
    Some(text.chars().skip(start).take(end.saturating_sub(start)).collect())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::index::MemoryIndexProvider;
    use crate::history::selectors::{IdSelector, RoleSelector};
    use crate::history::store::{JsonlHistoryStore, MemoryHistoryStore};
    use tempfile::tempdir;

    /// An index whose inserts fail.
    struct FailingIndex;

    impl SearchIndex for FailingIndex {
        fn insert(&self, _chunks: &[Tag]) -> Result<()> {
            Err(StoreError::Index("index unavailable".into()))
        }
        fn search(&self, _query: &str, _k: usize) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }
        fn reset(&self) -> Result<()> {
            Ok(())
        }
        fn len(&self) -> usize {
            0
        }
    }

    struct FailingIndexProvider;

    impl IndexProvider for FailingIndexProvider {
        fn open(&self, _handle: &str) -> Result<Arc<dyn SearchIndex>> {
            Ok(Arc::new(FailingIndex))
        }
    }

    fn keys(id: &str) -> ContextKeys {
        let mut keys = ContextKeys::new();
        keys.insert("id".into(), id.into());
        keys
    }

    fn open(store: &Arc<dyn HistoryStore>, indexes: &MemoryIndexProvider, id: &str) -> ChatHistory {
        ChatHistory::get_or_create(store.clone(), indexes, &keys(id), vec![], &HistoryOptions::default())
            .unwrap()
    }

    fn memory() -> (Arc<dyn HistoryStore>, MemoryIndexProvider) {
        (Arc::new(MemoryHistoryStore::new()), MemoryIndexProvider::new())
    }

    #[test]
    fn test_get_or_create_reuses_history() {
        let (store, indexes) = memory();
        let first = open(&store, &indexes, "42");
        first.append_user_message("hello").unwrap();

        let second = open(&store, &indexes, "42");
        assert_eq!(second.id(), first.id());
        assert_eq!(second.len(), 1);

        let other = open(&store, &indexes, "43");
        assert_ne!(other.id(), first.id());
        assert!(other.is_empty());
    }

    #[test]
    fn test_ambiguous_keys() {
        let (store, indexes) = memory();
        store.create(HistoryRecord::new(keys("dup"), vec![], "a")).unwrap();
        store.create(HistoryRecord::new(keys("dup"), vec![], "b")).unwrap();

        let err = ChatHistory::get_or_create(store, &indexes, &keys("dup"), vec![], &HistoryOptions::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::Ambiguous { count: 2 }));
    }

    #[test]
    fn test_search_round_trip() {
        let (store, indexes) = memory();
        let history = open(&store, &indexes, "search");
        history.append_user_message("Hi. My birthday is today").unwrap();
        history.append_assistant_message("Happy birthday!").unwrap();
        history.append_user_message("I also like shiny cars").unwrap();

        let hits = history.search("shiny cars", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tag.text.as_deref(), Some("I also like shiny cars"));

        assert!(history.search("", 3).unwrap().is_empty());
    }

    #[test]
    fn test_status_messages_not_indexed() {
        let (store, indexes) = memory();
        let history = open(&store, &indexes, "status");
        let msg = history.append_tool_message("searching weather").unwrap();
        history.append_agent_message("thinking about weather").unwrap();
        history.append_llm_message("weather from cache").unwrap();

        assert_eq!(msg.chunk_tags().count(), 0);
        assert!(history.search("weather", 5).unwrap().is_empty());
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_message_tags() {
        let (store, indexes) = memory();
        let history = open(&store, &indexes, "tags");
        let msg = history.append_user_message("hello").unwrap();

        let role = msg.tags.iter().find(|t| t.name.as_deref() == Some(tags::NAME_ROLE)).unwrap();
        assert_eq!(role.value, Some(serde_json::json!("user")));
        assert!(msg.tags.iter().any(|t| t.name.as_deref() == Some(tags::NAME_MESSAGE)));
        assert_eq!(msg.chunk_tags().count(), 1);
    }

    #[test]
    fn test_binary_block_not_chunked() {
        let (store, indexes) = memory();
        let history = open(&store, &indexes, "binary");
        let msg = history
            .append_block(Block::reference("img-1", "image/png"), Role::User)
            .unwrap();
        assert_eq!(msg.chunk_tags().count(), 0);
        assert_eq!(history.last_user_message().unwrap().id, msg.id);
    }

    #[test]
    fn test_not_searchable() {
        let (store, indexes) = memory();
        let options = HistoryOptions {
            searchable: false,
            ..Default::default()
        };
        let history = ChatHistory::get_or_create(store, &indexes, &keys("plain"), vec![], &options).unwrap();
        history.append_user_message("hello").unwrap();

        assert!(!history.is_searchable());
        assert!(matches!(history.search("hello", 1), Err(StoreError::NotSearchable)));
        // Empty query short-circuits before the searchability check.
        assert!(history.search("  ", 1).unwrap().is_empty());
    }

    #[test]
    fn test_last_messages() {
        let (store, indexes) = memory();
        let history = open(&store, &indexes, "last");
        assert!(history.last_user_message().is_none());
        assert!(history.last_system_message().is_none());
        assert!(history.last_agent_message().is_none());
        assert!(history.initial_system_prompt().is_none());

        history.append_system_message("You are helpful.").unwrap();
        history.append_user_message("first").unwrap();
        history.append_assistant_message("reply").unwrap();
        history.append_user_message("second").unwrap();

        assert_eq!(history.last_user_message().unwrap().text.as_deref(), Some("second"));
        assert_eq!(history.last_agent_message().unwrap().text.as_deref(), Some("reply"));
        assert_eq!(
            history.initial_system_prompt().unwrap().text.as_deref(),
            Some("You are helpful.")
        );
    }

    #[test]
    fn test_initial_system_prompt_requires_first_position() {
        let (store, indexes) = memory();
        let history = open(&store, &indexes, "late-system");
        history.append_user_message("hi").unwrap();
        history.append_system_message("late").unwrap();
        assert!(history.initial_system_prompt().is_none());
        assert!(history.last_system_message().is_some());
    }

    #[test]
    fn test_delete_messages_rebuilds_index() {
        let (store, indexes) = memory();
        let history = open(&store, &indexes, "delete");
        let bananas = history.append_user_message("I like bananas").unwrap();
        history.append_user_message("I like shiny cars").unwrap();
        history.append_assistant_message("noted").unwrap();

        let removed = history.delete_messages(&IdSelector::new([bananas.id.clone()])).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(history.len(), 2);
        assert!(history.search("bananas", 5).unwrap().is_empty());
        assert_eq!(history.search("cars", 5).unwrap().len(), 1);

        let removed = history.delete_messages(&RoleSelector { role: Role::Assistant }).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(history.messages()[0].text.as_deref(), Some("I like shiny cars"));
    }

    #[test]
    fn test_append_block_replaces_copied_message_tags() {
        let (store, indexes) = memory();
        let history = open(&store, &indexes, "echo");
        let user = history.append_user_message("weather in SF").unwrap();

        let mut echoed = user.to_block();
        echoed.tags.push(Tag::new("sentiment", "neutral"));
        let reply = history.append_block(echoed, Role::Assistant).unwrap();

        let roles: Vec<_> = reply
            .tags
            .iter()
            .filter(|t| t.name.as_deref() == Some(tags::NAME_ROLE))
            .map(|t| t.value.clone())
            .collect();
        assert_eq!(roles, vec![Some(serde_json::json!("assistant"))]);
        assert!(reply.tags.iter().any(|t| t.kind == "sentiment"));
        assert!(reply.chunk_tags().all(|t| t.block_id.as_deref() == Some(reply.id.as_str())));

        history.delete_messages(&IdSelector::new([user.id.clone()])).unwrap();
        let hits = history.search("weather", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tag.block_id.as_deref(), Some(reply.id.as_str()));
    }

    #[test]
    fn test_failed_index_insert_keeps_message_unsearchable() {
        let store: Arc<dyn HistoryStore> = Arc::new(MemoryHistoryStore::new());
        let history = ChatHistory::get_or_create(
            store.clone(),
            &FailingIndexProvider,
            &keys("flaky"),
            vec![],
            &HistoryOptions::default(),
        )
        .unwrap();

        let err = history.append_user_message("remember the red bicycle").unwrap_err();
        assert!(matches!(err, StoreError::Index(_)));
        assert_eq!(history.len(), 1);
        assert_eq!(store.load(&history.id()).unwrap().messages.len(), 1);
        assert!(history.search("red bicycle", 1).unwrap().is_empty());

        // Reopening with a working index heals it from the stored chunk tags.
        let healed = open(&store, &MemoryIndexProvider::new(), "flaky");
        assert_eq!(healed.search("red bicycle", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_clear() {
        let (store, indexes) = memory();
        let history = open(&store, &indexes, "clear");
        history.append_system_message("system").unwrap();
        history.append_user_message("hello there").unwrap();

        history.clear().unwrap();
        assert!(history.is_empty());
        assert!(history.search("hello", 5).unwrap().is_empty());

        // The history itself survives.
        assert_eq!(open(&store, &indexes, "clear").id(), history.id());
    }

    #[test]
    fn test_reopen_rebuilds_empty_index() {
        let dir = tempdir().unwrap();
        let id;
        {
            let store: Arc<dyn HistoryStore> = Arc::new(JsonlHistoryStore::new(dir.path()).unwrap());
            let history = open(&store, &MemoryIndexProvider::new(), "disk");
            history.append_user_message("remember the red bicycle").unwrap();
            id = history.id();
        }

        // Fresh process: history on disk, index provider empty.
        let store: Arc<dyn HistoryStore> = Arc::new(JsonlHistoryStore::new(dir.path()).unwrap());
        let history = open(&store, &MemoryIndexProvider::new(), "disk");
        assert_eq!(history.id(), id);
        let hits = history.search("red bicycle", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tag.block_id.as_deref(), Some(history.messages()[0].id.as_str()));
    }

    #[test]
    fn test_chunk_text_restored_from_message() {
        let mut msg = ChatMessage::from_text(Role::User, "abcdef");
        let tag = Tag {
            start_idx: Some(2),
            end_idx: Some(4),
            ..Tag::new(tags::KIND_CHAT, tags::NAME_CHUNK)
        };
        msg.tags.push(tag.clone());
        assert_eq!(chunk_text(&msg, &tag).as_deref(), Some("cd"));
    }
}
