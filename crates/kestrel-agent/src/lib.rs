//! Kestrel Agent: actions, tools, caches, context and the run executor.
//!
//! This crate contains:
//! - **action**: `Action` and the finish action ending a run
//! - **tools**: Tool trait and the closed tool registry
//! - **agent**: the policy trait choosing the next action
//! - **cache**: per-context action and LLM caches
//! - **context**: `AgentContext`, the state a run works on
//! - **service**: `AgentService`, the select/execute loop

pub mod action;
pub mod agent;
pub mod cache;
pub mod context;
pub mod error;
pub mod service;
pub mod tools;

pub use action::{Action, FINISH_TOOL};
pub use agent::Agent;
pub use cache::{ActionCache, LlmCache};
pub use context::{AgentContext, ContextOptions, EmitFunc};
pub use error::AgentError;
pub use service::{AgentService, RunState, StreamingOpts};
pub use tools::{Tool, ToolOutput, ToolRegistry};
