//! Message selectors: pick which messages of a history an agent sees, or
//! which ones to delete.

use crate::types::{ChatMessage, Role};

/// Chooses a subset of messages, preserving their order.
pub trait MessageSelector: Send + Sync {
    fn select(&self, messages: &[ChatMessage]) -> Vec<ChatMessage>;
}

fn is_dialogue(message: &ChatMessage) -> bool {
    matches!(message.role, Role::User | Role::Assistant)
}

/// Everything but the last message (the prompt being answered).
fn before_prompt(messages: &[ChatMessage]) -> &[ChatMessage] {
    match messages.split_last() {
        Some((_, rest)) => rest,
        None => messages,
    }
}

/// Rough token count: four characters per token, rounded up.
pub fn estimate_tokens(message: &ChatMessage) -> usize {
    let chars = message.text.as_deref().map_or(0, |t| t.chars().count());
    chars.div_ceil(4)
}

/// Selects nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMessages;

impl MessageSelector for NoMessages {
    fn select(&self, _messages: &[ChatMessage]) -> Vec<ChatMessage> {
        Vec::new()
    }
}

/// Selects everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllMessages;

impl MessageSelector for AllMessages {
    fn select(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        messages.to_vec()
    }
}

/// The last `k` exchanges (up to `2k` user/assistant messages) before the
/// current prompt.
#[derive(Clone, Copy, Debug)]
pub struct MessageWindowSelector {
    pub k: usize,
}

impl MessageSelector for MessageWindowSelector {
    fn select(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        let history = before_prompt(messages);
        let start = history.len().saturating_sub(self.k.saturating_mul(2));
        history[start..]
            .iter()
            .filter(|m| is_dialogue(m))
            .cloned()
            .collect()
    }
}

/// The most recent non-system messages before the current prompt that fit
/// under `max_tokens`.
///
/// Walks backwards and skips (rather than stops at) a message that would
/// overflow the budget, so a later short message can still fit.
#[derive(Clone, Copy, Debug)]
pub struct TokenWindowSelector {
    pub max_tokens: usize,
}

impl MessageSelector for TokenWindowSelector {
    fn select(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut used = 0;
        let mut selected: Vec<ChatMessage> = Vec::new();
        for message in before_prompt(messages).iter().rev() {
            if message.role == Role::System || used >= self.max_tokens {
                continue;
            }
            let cost = estimate_tokens(message);
            if used + cost < self.max_tokens {
                selected.push(message.clone());
                used += cost;
            }
        }
        selected.reverse();
        selected
    }
}

/// Every message with the given role.
#[derive(Clone, Copy, Debug)]
pub struct RoleSelector {
    pub role: Role,
}

impl MessageSelector for RoleSelector {
    fn select(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        messages.iter().filter(|m| m.role == self.role).cloned().collect()
    }
}

/// Messages with the given ids.
#[derive(Clone, Debug, Default)]
pub struct IdSelector {
    pub ids: Vec<String>,
}

impl IdSelector {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl MessageSelector for IdSelector {
    fn select(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        messages
            .iter()
            .filter(|m| self.ids.contains(&m.id))
            .cloned()
            .collect()
    }
}
