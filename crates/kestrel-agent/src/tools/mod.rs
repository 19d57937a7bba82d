//! Tool modules for Kestrel agents.

pub mod base;
pub mod registry;

pub use base::{require_text, Tool, ToolOutput};
pub use registry::ToolRegistry;
