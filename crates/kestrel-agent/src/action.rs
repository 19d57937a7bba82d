//! Actions: a tool bound to its input blocks, plus the output once run.

use kestrel_core::types::{Block, BlockKey};
use kestrel_core::utils::sha256_hex;
use serde::{Deserialize, Serialize};

/// Tool name carried by the action that ends a run.
pub const FINISH_TOOL: &str = "Agent-FinishAction";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub tool: String,
    #[serde(default)]
    pub input: Vec<Block>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<Block>>,
    #[serde(default)]
    pub is_final: bool,
}

#[derive(Serialize)]
struct ActionKey<'a> {
    tool: &'a str,
    input: Vec<BlockKey>,
}

impl Action {
    /// A non-final action calling `tool` with `input`.
    pub fn new(tool: impl Into<String>, input: Vec<Block>) -> Self {
        Action {
            tool: tool.into(),
            input,
            output: None,
            is_final: false,
        }
    }

    /// The action that ends a run with `output`.
    pub fn finish(output: Vec<Block>) -> Self {
        Action {
            tool: FINISH_TOOL.to_string(),
            input: Vec::new(),
            output: Some(output),
            is_final: true,
        }
    }

    /// Output blocks, or an empty slice if the action has not run.
    pub fn output_blocks(&self) -> &[Block] {
        self.output.as_deref().unwrap_or_default()
    }

    /// Structural cache key: tool name and canonical input, ignoring output.
    pub fn cache_key(&self) -> String {
        let key = ActionKey {
            tool: &self.tool,
            input: self.input.iter().map(Block::key).collect(),
        };
        sha256_hex(&serde_json::to_string(&key).unwrap_or_default())
    }
}

/// Structural cache key of a block sequence.
pub fn blocks_key(blocks: &[Block]) -> String {
    let keys: Vec<BlockKey> = blocks.iter().map(Block::key).collect();
    sha256_hex(&serde_json::to_string(&keys).unwrap_or_default())
}
