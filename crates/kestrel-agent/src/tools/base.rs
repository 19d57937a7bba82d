//! Tool trait: the interface every capability an agent can invoke implements.

use async_trait::async_trait;

use kestrel_core::types::Block;

use crate::context::AgentContext;

// ─────────────────────────────────────────────
// Tool trait
// ─────────────────────────────────────────────

/// What a tool returns.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutput {
    /// Finished output, available now.
    Blocks(Vec<Block>),
    /// Work continuing elsewhere under `task_id`. The executor rejects it.
    Deferred { task_id: String },
}

impl From<Vec<Block>> for ToolOutput {
    fn from(blocks: Vec<Block>) -> Self {
        ToolOutput::Blocks(blocks)
    }
}

/// Every agent tool implements this trait.
///
/// Agents pick tools by `name()`; the executor dispatches through `run()`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name an agent uses to select this tool (e.g. `"Weather"`).
    fn name(&self) -> &str;

    /// Description shown to the agent's policy when choosing a tool.
    fn agent_description(&self) -> &str;

    /// Description shown to people.
    fn human_description(&self) -> &str;

    /// Whether results may be served from the action cache.
    fn cacheable(&self) -> bool {
        true
    }

    /// Whether this tool's output ends the run.
    fn is_final(&self) -> bool {
        false
    }

    /// Run the tool.
    ///
    /// Errors are propagated to the caller of the run unmodified.
    async fn run(&self, input: &[Block], context: &AgentContext) -> anyhow::Result<ToolOutput>;
}

// ─────────────────────────────────────────────
// Input helpers
// ─────────────────────────────────────────────

/// Text of the first text block, or a user-friendly error.
pub fn require_text(input: &[Block]) -> anyhow::Result<&str> {
    input
        .iter()
        .filter(|b| b.is_text())
        .find_map(|b| b.as_text())
        .ok_or_else(|| anyhow::anyhow!("Expected a text block in tool input"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_text_present() {
        let input = vec![Block::reference("img", "image/png"), Block::text("SF")];
        assert_eq!(require_text(&input).unwrap(), "SF");
    }

    #[test]
    fn test_require_text_missing() {
        assert!(require_text(&[]).is_err());
        assert!(require_text(&[Block::reference("img", "image/png")]).is_err());
    }

    #[test]
    fn test_default_flags() {
        struct Plain;

        #[async_trait]
        impl Tool for Plain {
            fn name(&self) -> &str { "plain" }
            fn agent_description(&self) -> &str { "Does nothing" }
            fn human_description(&self) -> &str { "Does nothing" }
            async fn run(&self, _input: &[Block], _context: &AgentContext) -> anyhow::Result<ToolOutput> {
                Ok(Vec::new().into())
            }
        }

        assert!(Plain.cacheable());
        assert!(!Plain.is_final());
    }
}
