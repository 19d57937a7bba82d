//! Agent trait: the policy that decides what happens next in a run.

use async_trait::async_trait;

use crate::action::Action;
use crate::context::AgentContext;
use crate::tools::ToolRegistry;

/// Chooses the next action from the state of a context.
///
/// Typically backed by an LLM. Returning [`Action::finish`] ends the run;
/// any other action must name a tool in [`Agent::tools`].
#[async_trait]
pub trait Agent: Send + Sync {
    /// The tools this agent may select.
    fn tools(&self) -> &ToolRegistry;

    /// Decide the next action. Reads the chat history and completed steps.
    async fn next_action(&self, context: &AgentContext) -> anyhow::Result<Action>;
}
