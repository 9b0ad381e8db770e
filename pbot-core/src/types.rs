//! Core types: message roles, wire chat message, inbound message, and the
//! [`Session`] capability trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message, one-to-one with OpenAI Chat Completions API `role` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction (API `role: "system"`).
    System,
    /// User message (API `role: "user"`).
    User,
    /// Assistant message (API `role: "assistant"`).
    Assistant,
}

/// A single chat message, one-to-one with one element of the provider `messages` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// An inbound message from the hosting framework, reduced to what the chat
/// core needs: who sent it, where, and the text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Stable user identifier from the host framework.
    pub user_id: String,
    /// Display name, when the host provides one.
    pub username: Option<String>,
    /// Group identifier for group conversations; `None` for 1:1 chats.
    pub group_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Builds an inbound message stamped with the current time.
    pub fn new(
        user_id: impl Into<String>,
        username: Option<String>,
        group_id: Option<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username,
            group_id,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Narrow capability surface of the hosting framework session: identity plus
/// the ability to push an intermediate message (e.g. "thinking…") back to the
/// user. Everything else the host offers stays outside the core.
#[async_trait]
pub trait Session: Send + Sync {
    fn user_id(&self) -> &str;

    /// Group id when the session belongs to a group conversation.
    fn group_id(&self) -> Option<&str> {
        None
    }

    /// Display name for sender tagging in group history.
    fn username(&self) -> Option<&str> {
        None
    }

    /// Sends a side-channel message to the user. Failures are the host's
    /// problem; callers log and continue.
    async fn send(&self, content: &str) -> crate::error::Result<()>;
}
