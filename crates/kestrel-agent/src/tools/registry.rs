//! Tool Registry: the closed set of tools an agent may select, keyed by name.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::base::Tool;
use crate::error::{AgentError, Result};

// ─────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────

/// Stores tools keyed by name.
///
/// Owns `Arc<dyn Tool>` so tools can be shared across agents and threads.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a fixed tool set, rejecting duplicate names.
    pub fn from_tools(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Result<Self> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    /// Register a tool. A name already in use is an error.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AgentError::DuplicateTool { tool: name });
        }
        info!(tool = %name, cacheable = tool.cacheable(), "registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Look up a tool by name, failing with [`AgentError::UnknownTool`].
    pub fn resolve(&self, name: &str) -> Result<&Arc<dyn Tool>> {
        self.tools.get(name).ok_or_else(|| {
            warn!(tool = name, "tool not found");
            AgentError::UnknownTool {
                tool: name.to_string(),
            }
        })
    }

    /// Check if a tool is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Names of all registered tools, sorted for determinism.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// `name: agent description` lines for every tool, sorted by name.
    pub fn describe(&self) -> String {
        self.tool_names()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| format!("{}: {}", t.name(), t.agent_description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AgentContext;
    use crate::tools::base::ToolOutput;
    use async_trait::async_trait;
    use kestrel_core::types::Block;

    /// Minimal test tool.
    struct EchoTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn agent_description(&self) -> &str {
            "Echoes back the input"
        }
        fn human_description(&self) -> &str {
            "Echo"
        }
        async fn run(&self, input: &[Block], _context: &AgentContext) -> anyhow::Result<ToolOutput> {
            Ok(input.to_vec().into())
        }
    }

    fn echo(name: &'static str) -> Arc<dyn Tool> {
        Arc::new(EchoTool { name })
    }

    #[test]
    fn test_from_tools_and_lookup() {
        let reg = ToolRegistry::from_tools([echo("echo"), echo("search")]).unwrap();
        assert!(reg.has("echo"));
        assert!(!reg.has("nope"));
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.tool_names(), vec!["echo", "search"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = ToolRegistry::from_tools([echo("echo"), echo("echo")]).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool { tool } if tool == "echo"));
    }

    #[test]
    fn test_resolve_unknown() {
        let reg = ToolRegistry::from_tools([echo("echo")]).unwrap();
        assert!(reg.resolve("echo").is_ok());
        assert!(matches!(
            reg.resolve("missing"),
            Err(AgentError::UnknownTool { tool }) if tool == "missing"
        ));
    }

    #[test]
    fn test_describe() {
        let reg = ToolRegistry::from_tools([echo("b"), echo("a")]).unwrap();
        assert_eq!(reg.describe(), "a: Echoes back the input\nb: Echoes back the input");
    }

    #[test]
    fn test_empty_registry() {
        let reg = ToolRegistry::new();
        assert!(reg.is_empty());
        assert!(reg.tool_names().is_empty());
    }
}
