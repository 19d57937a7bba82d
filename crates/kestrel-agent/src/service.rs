//! Agent service: runs an agent over a context until it finishes.
//!
//! A run alternates between selecting an action (asking the agent, or the
//! LLM cache) and executing it (running the tool, or reading the action
//! cache). It ends when a finish action is selected or a final tool runs,
//! and fails when more than `max_actions_per_run` actions would execute.
//!
//! ```text
//!   Select ──non-final──▶ Execute ──▶ Select
//!     │                      │
//!     └──finish──▶ Done ◀──final tool
//!   Select ──budget spent──▶ Failed
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use kestrel_core::config::{Config, StreamingConfig};
use kestrel_core::types::{Block, ContextKeys, Role};
use kestrel_core::Backends;

use crate::action::Action;
use crate::agent::Agent;
use crate::context::{AgentContext, ContextOptions};
use crate::error::{AgentError, Result};
use crate::tools::ToolOutput;

/// Default maximum non-final actions per run.
const DEFAULT_MAX_ACTIONS_PER_RUN: usize = 5;

/// States of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Select,
    Execute,
    Done,
    Failed,
}

/// Which status messages a run writes into the chat history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamingOpts {
    pub include_agent_messages: bool,
    pub include_tool_messages: bool,
    pub include_llm_messages: bool,
}

impl From<&StreamingConfig> for StreamingOpts {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            include_agent_messages: config.include_agent_messages,
            include_tool_messages: config.include_tool_messages,
            include_llm_messages: config.include_llm_messages,
        }
    }
}

/// Non-final actions must name a tool the agent has.
fn check_tool(agent: &dyn Agent, action: &Action) -> Result<()> {
    if !action.is_final {
        agent.tools().resolve(&action.tool)?;
    }
    Ok(())
}

fn describe_blocks(blocks: &[Block]) -> String {
    blocks.iter().map(Block::describe).collect::<Vec<_>>().join(", ")
}

// ─────────────────────────────────────────────
// AgentService
// ─────────────────────────────────────────────

pub struct AgentService {
    agent: Option<Arc<dyn Agent>>,
    backends: Backends,
    context_options: ContextOptions,
    max_actions_per_run: usize,
    streaming: StreamingOpts,
}

impl AgentService {
    /// A service over `backends` with settings from `config`. No agent yet.
    pub fn new(backends: Backends, config: &Config) -> Self {
        info!(
            max_actions_per_run = config.agent.max_actions_per_run,
            use_llm_cache = config.agent.use_llm_cache,
            use_action_cache = config.agent.use_action_cache,
            "agent service initialized"
        );
        Self {
            agent: None,
            backends,
            context_options: ContextOptions::from(config),
            max_actions_per_run: config.agent.max_actions_per_run,
            streaming: StreamingOpts::from(&config.agent.streaming),
        }
    }

    /// In-memory backends and default settings.
    pub fn in_memory() -> Self {
        Self {
            agent: None,
            backends: Backends::in_memory(),
            context_options: ContextOptions::default(),
            max_actions_per_run: DEFAULT_MAX_ACTIONS_PER_RUN,
            streaming: StreamingOpts::default(),
        }
    }

    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_max_actions_per_run(mut self, max_actions: usize) -> Self {
        self.max_actions_per_run = max_actions;
        self
    }

    pub fn with_streaming(mut self, streaming: StreamingOpts) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_context_options(mut self, options: ContextOptions) -> Self {
        self.context_options = options;
        self
    }

    /// The configured agent.
    pub fn agent(&self) -> Result<&Arc<dyn Agent>> {
        self.agent.as_ref().ok_or(AgentError::MissingAgent)
    }

    pub fn max_actions_per_run(&self) -> usize {
        self.max_actions_per_run
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Resolve the context for `context_keys` with this service's options.
    pub fn build_context(&self, context_keys: &ContextKeys) -> Result<AgentContext> {
        Ok(AgentContext::get_or_create(
            &self.backends,
            context_keys,
            &self.context_options,
        )?)
    }

    // ─────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────

    /// Choose the next action for `input`.
    ///
    /// Served from the LLM cache when it holds an entry for `input`; otherwise
    /// the agent decides and the decision is stored. A decision naming an
    /// unknown tool fails with [`AgentError::UnknownTool`] and is never cached;
    /// a cached one is evicted.
    pub async fn next_action(
        &self,
        agent: &dyn Agent,
        input: &[Block],
        context: &AgentContext,
    ) -> Result<Action> {
        if let Some(cache) = &context.llm_cache {
            if let Some(action) = cache.lookup(input) {
                if let Err(e) = check_tool(agent, &action) {
                    warn!(request_id = %context.request_id, tool = %action.tool, "dropping cached decision for unknown tool");
                    if let Err(err) = cache.delete(input) {
                        warn!(request_id = %context.request_id, error = %err, "llm cache delete failed");
                    }
                    return Err(e);
                }
                debug!(request_id = %context.request_id, tool = %action.tool, "llm cache hit");
                if self.streaming.include_llm_messages {
                    context
                        .chat_history
                        .append_llm_message(format!("Using cached decision: {}", action.tool))?;
                }
                return Ok(action);
            }
        }

        let action = agent
            .next_action(context)
            .await
            .map_err(AgentError::Policy)?;
        debug!(request_id = %context.request_id, tool = %action.tool, "agent selected action");
        check_tool(agent, &action)?;

        if let Some(cache) = &context.llm_cache {
            match cache.update(input, &action) {
                Ok(()) => {
                    if self.streaming.include_llm_messages {
                        context
                            .chat_history
                            .append_llm_message(format!("Cached decision: {}", action.tool))?;
                    }
                }
                Err(e) => warn!(request_id = %context.request_id, error = %e, "llm cache write failed"),
            }
        }
        Ok(action)
    }

    // ─────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────

    /// Run `action`'s tool and record the action in `completed_steps`.
    ///
    /// Final actions are left untouched. Cacheable tools are served from and
    /// written to the action cache when the context has one.
    pub async fn run_action(
        &self,
        agent: &dyn Agent,
        action: &mut Action,
        context: &mut AgentContext,
    ) -> Result<()> {
        if action.is_final {
            return Ok(());
        }

        let tool = agent.tools().resolve(&action.tool)?.clone();
        let cacheable = tool.cacheable();

        let cached = if cacheable {
            context.action_cache.as_ref().and_then(|c| c.lookup(action))
        } else {
            None
        };
        if let Some(output) = cached {
            debug!(request_id = %context.request_id, tool = %action.tool, "action cache hit");
            self.stream_tool_output(context, &action.tool, &output)?;
            action.output = Some(output);
            context.completed_steps.push(action.clone());
            return Ok(());
        }

        info!(request_id = %context.request_id, tool = %action.tool, "running tool");
        let output = match tool
            .run(&action.input, context)
            .await
            .map_err(AgentError::Tool)?
        {
            ToolOutput::Blocks(blocks) => blocks,
            ToolOutput::Deferred { task_id } => {
                return Err(AgentError::DeferredToolResult {
                    tool: action.tool.clone(),
                    task_id,
                })
            }
        };

        self.stream_tool_output(context, &action.tool, &output)?;
        action.output = Some(output.clone());
        context.completed_steps.push(action.clone());

        if cacheable {
            if let Some(cache) = &context.action_cache {
                if let Err(e) = cache.update(action, &output) {
                    warn!(request_id = %context.request_id, tool = %action.tool, error = %e, "action cache write failed");
                }
            }
        }
        Ok(())
    }

    fn stream_tool_output(&self, context: &AgentContext, tool: &str, output: &[Block]) -> Result<()> {
        if self.streaming.include_tool_messages {
            context
                .chat_history
                .append_tool_message(format!("{tool} returned: {}", describe_blocks(output)))?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────
    // Runs
    // ─────────────────────────────────────────────

    /// Drive `agent` over `context` until it finishes.
    ///
    /// The first selection is seeded with the most recent user message (empty
    /// input if there is none); later ones with the previous action's output.
    /// On success every emit callback receives the finish output, in order,
    /// and the finish action is returned. Any error aborts the run before
    /// emission.
    pub async fn run_agent(&self, agent: &dyn Agent, context: &mut AgentContext) -> Result<Action> {
        context.completed_steps.clear();

        let mut input: Vec<Block> = context
            .chat_history
            .last_user_message()
            .map(|m| vec![m.to_block()])
            .unwrap_or_default();
        let mut executed = 0usize;
        let mut state = RunState::Select;
        let mut pending: Option<Action> = None;
        let mut finish: Option<Action> = None;

        info!(
            request_id = %context.request_id,
            max_actions = self.max_actions_per_run,
            "starting run"
        );

        loop {
            state = match state {
                RunState::Select => {
                    let action = self.next_action(agent, &input, context).await?;
                    if action.is_final {
                        finish = Some(action);
                        RunState::Done
                    } else if executed >= self.max_actions_per_run {
                        RunState::Failed
                    } else {
                        if self.streaming.include_agent_messages {
                            context.chat_history.append_agent_message(format!(
                                "Selected {} with input: {}",
                                action.tool,
                                describe_blocks(&action.input)
                            ))?;
                        }
                        pending = Some(action);
                        RunState::Execute
                    }
                }
                RunState::Execute => {
                    let Some(mut action) = pending.take() else {
                        return Err(AgentError::Policy(anyhow::anyhow!("no action to execute")));
                    };
                    self.run_action(agent, &mut action, context).await?;
                    executed += 1;

                    let output = action.output.clone().unwrap_or_default();
                    let is_final_tool = agent.tools().get(&action.tool).is_some_and(|t| t.is_final());
                    if is_final_tool {
                        debug!(request_id = %context.request_id, tool = %action.tool, "final tool finished the run");
                        finish = Some(Action::finish(output));
                        RunState::Done
                    } else {
                        input = output;
                        RunState::Select
                    }
                }
                RunState::Failed => {
                    warn!(
                        request_id = %context.request_id,
                        max_actions = self.max_actions_per_run,
                        "action budget exhausted"
                    );
                    return Err(AgentError::BudgetExceeded {
                        max_actions: self.max_actions_per_run,
                    });
                }
                RunState::Done => {
                    let Some(finish) = finish.take() else {
                        return Err(AgentError::Policy(anyhow::anyhow!("run finished without an action")));
                    };
                    context.completed_steps.push(finish.clone());
                    for emit in &context.emit_funcs {
                        emit(finish.output_blocks(), &context.metadata).map_err(AgentError::Emit)?;
                    }
                    info!(
                        request_id = %context.request_id,
                        steps = context.completed_steps.len(),
                        "run finished"
                    );
                    return Ok(finish);
                }
            };
        }
    }

    /// Answer one prompt on the conversation identified by `context_keys`.
    ///
    /// Appends the prompt as a user message, runs the configured agent and
    /// appends each output block as an assistant message.
    pub async fn prompt(&self, prompt: &str, context_keys: &ContextKeys) -> Result<Vec<Block>> {
        let agent = self.agent()?.clone();
        let mut context = self.build_context(context_keys)?;
        context.chat_history.append_user_message(prompt)?;

        let collected: Arc<Mutex<Vec<Block>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = collected.clone();
        context.add_emit_func(move |blocks, _metadata| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(blocks);
            Ok(())
        });

        self.run_agent(agent.as_ref(), &mut context).await?;

        let output = std::mem::take(&mut *collected.lock().unwrap_or_else(PoisonError::into_inner));
        for block in &output {
            context.chat_history.append_block(block.clone(), Role::Assistant)?;
        }
        Ok(output)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
