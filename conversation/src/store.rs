//! 1:1 conversation store.

use chrono::Duration;
use pbot_core::{ChatMessage, MessageRole};

use crate::config::ContextConfig;
use crate::engine::ContextEngine;
use crate::types::{ContextState, ContextStats, StoredMessage};

/// Per-user conversation store: a [`ContextEngine`] instantiated with bare
/// [`StoredMessage`] envelopes. The conversation key is the user id.
#[derive(Clone)]
pub struct ConversationStore {
    engine: ContextEngine<StoredMessage>,
    context_enabled: bool,
}

impl ConversationStore {
    pub fn new(config: ContextConfig) -> Self {
        let context_enabled = config.context_enabled;
        Self {
            engine: ContextEngine::new(config),
            context_enabled,
        }
    }

    /// Access to the underlying engine, mainly for persistence snapshots.
    pub fn engine(&self) -> &ContextEngine<StoredMessage> {
        &self.engine
    }

    pub async fn get_or_create(&self, key: &str) -> ContextState<StoredMessage> {
        self.engine.get_or_create(key).await
    }

    pub async fn add_message(&self, key: &str, role: MessageRole, content: &str) {
        self.engine
            .add_message(key, StoredMessage::new(role, content))
            .await;
    }

    pub async fn add_user_message(&self, key: &str, content: &str) {
        self.add_message(key, MessageRole::User, content).await;
    }

    pub async fn add_assistant_message(&self, key: &str, content: &str) {
        self.add_message(key, MessageRole::Assistant, content).await;
    }

    pub async fn clear_history(&self, key: &str) {
        self.engine.clear_history(key).await;
    }

    pub async fn set_persona(&self, key: &str, persona: &str) {
        self.engine.set_persona(key, persona).await;
    }

    /// Assembles the provider message list for the next completion call.
    /// History is included only while context is enabled in configuration.
    pub async fn build_context_messages(
        &self,
        key: &str,
        system_prompt: &str,
        user_message: &str,
    ) -> Vec<ChatMessage> {
        self.engine
            .build_prompt(key, system_prompt, user_message, self.context_enabled)
            .await
    }

    pub async fn stats(&self, key: &str) -> Option<ContextStats> {
        self.engine.stats(key).await
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.engine.remove(key).await
    }

    pub async fn cleanup_expired(&self) -> usize {
        self.engine.cleanup_expired().await
    }

    pub async fn remove_older_than(&self, cutoff: Duration) -> usize {
        self.engine.remove_older_than(cutoff).await
    }

    pub async fn len(&self) -> usize {
        self.engine.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.engine.is_empty().await
    }
}
