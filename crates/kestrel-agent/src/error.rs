//! Errors raised while selecting and executing actions.

use kestrel_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("No agent is configured on this service")]
    MissingAgent,

    #[error("Unknown tool: {tool}")]
    UnknownTool { tool: String },

    #[error("Duplicate tool name: {tool}")]
    DuplicateTool { tool: String },

    /// The run needed more non-final actions than the configured budget.
    #[error("Exceeded {max_actions} actions without finishing")]
    BudgetExceeded { max_actions: usize },

    #[error("Tool {tool} returned a deferred result (task {task_id}); deferred tool execution is not supported")]
    DeferredToolResult { tool: String, task_id: String },

    /// A tool failed. Carried unmodified.
    #[error(transparent)]
    Tool(anyhow::Error),

    /// An emit callback failed.
    #[error(transparent)]
    Emit(anyhow::Error),

    /// The agent's policy failed to choose an action.
    #[error(transparent)]
    Policy(anyhow::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
