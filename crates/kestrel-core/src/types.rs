//! Core types for Kestrel: blocks, tags, roles and chat messages.
//!
//! A [`Block`] is the unit of content exchanged between agents, tools and the
//! chat history. Blocks are either text or a reference to binary content held
//! elsewhere (by `id` or `url`).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Arbitrary per-run information shared between agents, tools and emit callbacks.
pub type Metadata = HashMap<String, serde_json::Value>;

/// Key/value pairs identifying one conversation.
///
/// Ordered so that hashing and persistence are deterministic.
pub type ContextKeys = BTreeMap<String, String>;

/// MIME type used for plain text blocks.
pub const MIME_TEXT: &str = "text/plain";

/// Tag kinds and names used by the chat history.
pub mod tags {
    /// Kind of every tag written by the chat history.
    pub const KIND_CHAT: &str = "chat";
    /// Name of the tag marking a block as a chat message.
    pub const NAME_MESSAGE: &str = "message";
    /// Name of the tags marking indexed chunks of a message.
    pub const NAME_CHUNK: &str = "chunk";
    /// Name of the tag carrying a message's role.
    pub const NAME_ROLE: &str = "role";
}

// ─────────────────────────────────────────────
// Tags
// ─────────────────────────────────────────────

/// Annotation attached to a block, optionally covering a character span.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Start of the covered span, in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_idx: Option<usize>,
    /// End of the covered span (exclusive), in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_idx: Option<usize>,
    /// Text of the covered span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Id of the block this tag belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
}

impl Tag {
    /// Create a tag with a kind and a name.
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Tag {
            kind: kind.into(),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Whether this tag is an indexed chunk of a chat message.
    pub fn is_chunk(&self) -> bool {
        self.kind == tags::KIND_CHAT && self.name.as_deref() == Some(tags::NAME_CHUNK)
    }
}

// ─────────────────────────────────────────────
// Blocks
// ─────────────────────────────────────────────

/// Atomic content unit: text, or a reference to binary content.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Block {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

/// Canonical identity of a block, used to build cache keys.
///
/// Text blocks are identified by their text, binary blocks by their id (or
/// url when no id was assigned).
#[derive(Clone, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BlockKey {
    Text(String),
    Id(String),
    Url(String),
    Empty,
}

impl Block {
    /// Create a text block.
    pub fn text(text: impl Into<String>) -> Self {
        Block {
            text: Some(text.into()),
            mime_type: Some(MIME_TEXT.to_string()),
            ..Default::default()
        }
    }

    /// Create a block referencing stored binary content.
    pub fn reference(id: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Block {
            id: Some(id.into()),
            mime_type: Some(mime_type.into()),
            ..Default::default()
        }
    }

    /// Create a block pointing at content by URL.
    pub fn url(url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Block {
            url: Some(url.into()),
            mime_type: Some(mime_type.into()),
            ..Default::default()
        }
    }

    /// Whether this is a text block.
    pub fn is_text(&self) -> bool {
        self.text.is_some()
            && self
                .mime_type
                .as_deref()
                .map_or(true, |m| m.starts_with("text/"))
    }

    /// The text content, if any.
    pub fn as_text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Canonical identity for cache keys.
    pub fn key(&self) -> BlockKey {
        if self.is_text() {
            return BlockKey::Text(self.text.clone().unwrap_or_default());
        }
        match (&self.id, &self.url, &self.text) {
            (Some(id), _, _) => BlockKey::Id(id.clone()),
            (None, Some(url), _) => BlockKey::Url(url.clone()),
            (None, None, Some(text)) => BlockKey::Text(text.clone()),
            (None, None, None) => BlockKey::Empty,
        }
    }

    /// Short human-readable description (for logs and status messages).
    pub fn describe(&self) -> String {
        match self.key() {
            BlockKey::Text(t) => crate::utils::truncate_string(&t, 80),
            BlockKey::Id(id) => format!("<block {id}>"),
            BlockKey::Url(url) => format!("<{url}>"),
            BlockKey::Empty => "<empty>".to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────

/// Author of a chat message.
///
/// `Agent`, `Tool` and `Llm` are status roles: progress messages emitted
/// during a run. They are stored but never indexed for search.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
    Assistant,
    Agent,
    Tool,
    Llm,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::System => "system",
            Role::Assistant => "assistant",
            Role::Agent => "agent",
            Role::Tool => "tool",
            Role::Llm => "llm",
        }
    }

    /// Whether messages with this role are run status updates.
    pub fn is_status(&self) -> bool {
        matches!(self, Role::Agent | Role::Tool | Role::Llm)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "system" => Ok(Role::System),
            "assistant" => Ok(Role::Assistant),
            "agent" => Ok(Role::Agent),
            "tool" => Ok(Role::Tool),
            "llm" => Ok(Role::Llm),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

// ─────────────────────────────────────────────
// Chat messages
// ─────────────────────────────────────────────

/// One entry of a chat history.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a message from a block's content. A fresh id is assigned.
    pub fn new(role: Role, block: Block) -> Self {
        ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            text: block.text,
            mime_type: block.mime_type,
            url: block.url,
            tags: block.tags,
            timestamp: Utc::now(),
        }
    }

    /// Shorthand for a text message.
    pub fn from_text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, Block::text(text))
    }

    /// The message content as a block (its id is the message id).
    pub fn to_block(&self) -> Block {
        Block {
            id: Some(self.id.clone()),
            text: self.text.clone(),
            mime_type: self.mime_type.clone(),
            url: self.url.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Indexed chunk tags of this message.
    pub fn chunk_tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter().filter(|t| t.is_chunk())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
