//! Chat wire types shared by the HTTP surface and the relay core

use serde::{Deserialize, Serialize};

/// Conversation role. Order in a message list is chronological turn order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Body of `POST /api/chat`
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Per-request overrides for relay behavior
    #[serde(default)]
    pub options: RequestOptions,
}

/// Optional per-request relay knobs. Anything unset falls back to the
/// `[relay]` configuration section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestOptions {
    /// Request a streamed (SSE) or single-JSON completion
    pub stream: Option<bool>,
    /// Gateway-side response cache TTL hint, in seconds
    pub cache_ttl: Option<u64>,
}

/// Ensure exactly one system turn sits at the front of the conversation.
///
/// If the client supplied no system message, the configured default prompt
/// is injected at index 0. A system message anywhere in the list is left
/// where the client put it.
pub fn ensure_system_prompt(messages: &mut Vec<ChatMessage>, default_prompt: &str) {
    if !messages.iter().any(|m| m.role == Role::System) {
        messages.insert(0, ChatMessage::system(default_prompt));
    }
}
