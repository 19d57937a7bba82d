//! AgentContext: the state of one conversation as seen by a run.
//!
//! Holds the chat history, the steps completed in the current run, the emit
//! callbacks receiving the final output and the optional caches.

use kestrel_core::config::Config;
use kestrel_core::error::Result as StoreResult;
use kestrel_core::history::{ChatHistory, HistoryOptions};
use kestrel_core::types::{Block, ContextKeys, Metadata, Tag};
use kestrel_core::Backends;
use tracing::{debug, info};

use crate::action::Action;
use crate::cache::{ActionCache, LlmCache};

/// Receives the output of a finished run together with the context metadata.
pub type EmitFunc = Box<dyn Fn(&[Block], &Metadata) -> anyhow::Result<()> + Send + Sync>;

/// How a context is resolved.
#[derive(Clone, Debug, Default)]
pub struct ContextOptions {
    pub use_action_cache: bool,
    pub use_llm_cache: bool,
    pub history: HistoryOptions,
    /// Tags stored on a newly created history.
    pub tags: Vec<Tag>,
}

impl From<&Config> for ContextOptions {
    fn from(config: &Config) -> Self {
        Self {
            use_action_cache: config.agent.use_action_cache,
            use_llm_cache: config.agent.use_llm_cache,
            history: HistoryOptions::from(&config.history),
            tags: Vec::new(),
        }
    }
}

pub struct AgentContext {
    /// Free-form values shared with tools and emit callbacks.
    pub metadata: Metadata,
    pub chat_history: ChatHistory,
    /// Actions run so far in the current run, in order.
    pub completed_steps: Vec<Action>,
    pub emit_funcs: Vec<EmitFunc>,
    pub action_cache: Option<ActionCache>,
    pub llm_cache: Option<LlmCache>,
    /// Unique per resolved context.
    pub request_id: String,
}

impl AgentContext {
    /// A context over an already opened history, without caches.
    pub fn new(chat_history: ChatHistory) -> Self {
        AgentContext {
            metadata: Metadata::new(),
            chat_history,
            completed_steps: Vec::new(),
            emit_funcs: Vec::new(),
            action_cache: None,
            llm_cache: None,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Resolve the context for `context_keys`: its single chat history (created
    /// on first use) and the caches enabled in `options`.
    pub fn get_or_create(
        backends: &Backends,
        context_keys: &ContextKeys,
        options: &ContextOptions,
    ) -> StoreResult<Self> {
        let chat_history = ChatHistory::get_or_create(
            backends.histories.clone(),
            backends.indexes.as_ref(),
            context_keys,
            options.tags.clone(),
            &options.history,
        )?;

        let mut context = AgentContext::new(chat_history);
        if options.use_action_cache {
            context.action_cache = Some(ActionCache::open(backends.kv.as_ref(), context_keys)?);
        }
        if options.use_llm_cache {
            context.llm_cache = Some(LlmCache::open(backends.kv.as_ref(), context_keys)?);
        }

        debug!(
            request_id = %context.request_id,
            history = %context.chat_history.id(),
            action_cache = context.action_cache.is_some(),
            llm_cache = context.llm_cache.is_some(),
            "resolved agent context"
        );
        Ok(context)
    }

    /// Register a callback for the output of every run on this context.
    /// Callbacks run in registration order.
    pub fn add_emit_func<F>(&mut self, func: F)
    where
        F: Fn(&[Block], &Metadata) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.emit_funcs.push(Box::new(func));
    }

    pub fn context_keys(&self) -> ContextKeys {
        self.chat_history.context_keys()
    }

    /// Delete every message of the history and empty the attached caches, so
    /// later runs cannot replay decisions made for the deleted conversation.
    pub fn clear_history(&self) -> StoreResult<()> {
        self.chat_history.clear()?;
        if let Some(cache) = &self.action_cache {
            cache.clear()?;
        }
        if let Some(cache) = &self.llm_cache {
            cache.clear()?;
        }
        info!(request_id = %self.request_id, history = %self.chat_history.id(), "cleared context history and caches");
        Ok(())
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("request_id", &self.request_id)
            .field("chat_history", &self.chat_history)
            .field("completed_steps", &self.completed_steps.len())
            .field("emit_funcs", &self.emit_funcs.len())
            .field("action_cache", &self.action_cache)
            .field("llm_cache", &self.llm_cache)
            .finish()
    }
}
