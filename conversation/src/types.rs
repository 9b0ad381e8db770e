//! Conversation types: stored message, group envelope, context state, stats.
//!
//! # External Interactions
//!
//! - **AI Models**: stored history is rendered into provider chat messages
//! - **Persistence**: every type here is a JSON-serializable projection
//! - **Token Management**: per-message token counts are estimated once at
//!   insertion and cached

use chrono::{DateTime, Utc};
use pbot_core::MessageRole;
use serde::{Deserialize, Serialize};

use crate::tokens::estimate_tokens;

/// A single stored conversation message. Immutable once stored except for
/// front-trimming of the containing list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: MessageRole,
    pub content: String,
    /// When the message was inserted.
    pub timestamp: DateTime<Utc>,
    /// Estimated token count, computed at insertion and cached thereafter.
    pub tokens: Option<u32>,
}

impl StoredMessage {
    /// Creates an unstamped message; the engine stamps time and tokens on insert.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tokens: None,
        }
    }

    /// Cached token count, recomputed when missing.
    pub fn token_count(&self) -> usize {
        match self.tokens {
            Some(t) => t as usize,
            None => estimate_tokens(&self.content),
        }
    }
}

/// Message envelope stored by the generic context engine. The 1:1 store keeps
/// bare [`StoredMessage`]s; the group layer wraps them with sender identity.
pub trait Envelope: Clone + Send + Sync + 'static {
    fn message(&self) -> &StoredMessage;
    fn message_mut(&mut self) -> &mut StoredMessage;

    /// Text rendered into the prompt for this envelope.
    fn prompt_content(&self) -> String {
        self.message().content.clone()
    }
}

impl Envelope for StoredMessage {
    fn message(&self) -> &StoredMessage {
        self
    }

    fn message_mut(&mut self) -> &mut StoredMessage {
        self
    }
}

/// A group conversation message tagged with its sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub message: StoredMessage,
}

impl GroupMessage {
    pub fn new(
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            message: StoredMessage::new(role, content),
        }
    }
}

impl Envelope for GroupMessage {
    fn message(&self) -> &StoredMessage {
        &self.message
    }

    fn message_mut(&mut self) -> &mut StoredMessage {
        &mut self.message
    }

    /// User messages carry the sender name so the model can follow who said
    /// what in a shared context.
    fn prompt_content(&self) -> String {
        match self.message.role {
            MessageRole::User => format!("{}: {}", self.sender_name, self.message.content),
            _ => self.message.content.clone(),
        }
    }
}

/// Per-key conversation state owned by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextState<E> {
    /// Ordered history, insertion order = chronological.
    pub messages: Vec<E>,
    /// Persona name currently bound to this conversation.
    pub persona: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<E> ContextState<E> {
    pub(crate) fn fresh(persona: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            messages: Vec::new(),
            persona: persona.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Derived statistics for one conversation context. Read-only view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextStats {
    pub message_count: usize,
    /// Count of user-role messages. A failed turn that stored the user
    /// message but no reply still counts as a round.
    pub rounds: usize,
    pub total_tokens: usize,
    pub persona: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
