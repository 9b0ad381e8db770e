//! Group session layer.
//!
//! A [`ContextEngine`] instantiated with sender-tagged [`GroupMessage`]
//! envelopes, plus the bookkeeping only groups need: a bounded member set per
//! group, a user→groups reverse index kept consistent on every membership
//! change and on group deletion, and a per-group shared-context toggle that
//! gates whether stored history reaches the prompt at all.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Duration;
use pbot_core::{ChatMessage, MessageRole};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::ContextConfig;
use crate::engine::ContextEngine;
use crate::types::{ContextState, ContextStats, GroupMessage};

/// Conversation key for a group id.
pub fn group_key(group_id: &str) -> String {
    format!("group_{}", group_id)
}

/// Group-layer tuning knobs.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Hard cap on members per group; joins beyond it are rejected, not evicted.
    pub max_members: usize,
    /// Whether new groups start with shared context on.
    pub shared_context_default: bool,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            max_members: 100,
            shared_context_default: true,
        }
    }
}

/// Membership and toggle state for one group. The member set is owned here
/// exclusively; the engine only sees the message history.
#[derive(Debug, Clone)]
struct GroupState {
    members: HashSet<String>,
    enable_shared_context: bool,
}

/// Multi-member group conversations over the shared context engine.
#[derive(Clone)]
pub struct GroupSessionManager {
    engine: ContextEngine<GroupMessage>,
    groups: Arc<RwLock<HashMap<String, GroupState>>>,
    user_groups: Arc<RwLock<HashMap<String, HashSet<String>>>>,
    config: GroupConfig,
}

impl GroupSessionManager {
    pub fn new(context_config: ContextConfig, config: GroupConfig) -> Self {
        Self {
            engine: ContextEngine::new(context_config),
            groups: Arc::new(RwLock::new(HashMap::new())),
            user_groups: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Access to the underlying engine, mainly for persistence snapshots.
    pub fn engine(&self) -> &ContextEngine<GroupMessage> {
        &self.engine
    }

    /// Adds a user to a group, creating the group state on first contact.
    /// Returns false (and logs) when the group is full; existing members are
    /// never evicted. Re-adding a member is a no-op that succeeds.
    pub async fn add_member(&self, group_id: &str, user_id: &str) -> bool {
        let mut groups = self.groups.write().await;
        let state = groups
            .entry(group_id.to_string())
            .or_insert_with(|| GroupState {
                members: HashSet::new(),
                enable_shared_context: self.config.shared_context_default,
            });

        if state.members.contains(user_id) {
            return true;
        }
        if state.members.len() >= self.config.max_members {
            warn!(
                group_id = %group_id,
                user_id = %user_id,
                max_members = self.config.max_members,
                "Group is full, member rejected"
            );
            return false;
        }

        state.members.insert(user_id.to_string());
        drop(groups);

        let mut user_groups = self.user_groups.write().await;
        user_groups
            .entry(user_id.to_string())
            .or_default()
            .insert(group_id.to_string());
        true
    }

    /// Removes a user from a group. Returns false when the user was not a
    /// member. The reverse-index entry disappears once its last group is gone.
    pub async fn remove_member(&self, group_id: &str, user_id: &str) -> bool {
        let mut groups = self.groups.write().await;
        let removed = match groups.get_mut(group_id) {
            Some(state) => state.members.remove(user_id),
            None => false,
        };
        drop(groups);

        if removed {
            let mut user_groups = self.user_groups.write().await;
            if let Some(set) = user_groups.get_mut(user_id) {
                set.remove(group_id);
                if set.is_empty() {
                    user_groups.remove(user_id);
                }
            }
        }
        removed
    }

    pub async fn get_members(&self, group_id: &str) -> HashSet<String> {
        self.groups
            .read()
            .await
            .get(group_id)
            .map(|state| state.members.clone())
            .unwrap_or_default()
    }

    /// Groups the user currently belongs to; empty when untracked.
    pub async fn get_user_groups(&self, user_id: &str) -> HashSet<String> {
        self.user_groups
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the reverse index still carries an entry for this user.
    pub async fn has_user(&self, user_id: &str) -> bool {
        self.user_groups.read().await.contains_key(user_id)
    }

    /// Deletes a group: its context, its member set, and every reverse-index
    /// reference to it. Returns false when the group was unknown.
    pub async fn delete_group(&self, group_id: &str) -> bool {
        let state = self.groups.write().await.remove(group_id);
        self.engine.remove(&group_key(group_id)).await;

        match state {
            Some(state) => {
                let mut user_groups = self.user_groups.write().await;
                for member in &state.members {
                    if let Some(set) = user_groups.get_mut(member) {
                        set.remove(group_id);
                        if set.is_empty() {
                            user_groups.remove(member);
                        }
                    }
                }
                info!(group_id = %group_id, "Group deleted");
                true
            }
            None => false,
        }
    }

    pub async fn set_shared_context(&self, group_id: &str, enabled: bool) {
        let mut groups = self.groups.write().await;
        let state = groups
            .entry(group_id.to_string())
            .or_insert_with(|| GroupState {
                members: HashSet::new(),
                enable_shared_context: self.config.shared_context_default,
            });
        state.enable_shared_context = enabled;
    }

    pub async fn shared_context_enabled(&self, group_id: &str) -> bool {
        self.groups
            .read()
            .await
            .get(group_id)
            .map(|state| state.enable_shared_context)
            .unwrap_or(self.config.shared_context_default)
    }

    /// Appends a sender-tagged message to the group history.
    pub async fn add_group_message(
        &self,
        group_id: &str,
        sender_id: &str,
        sender_name: &str,
        role: MessageRole,
        content: &str,
    ) {
        self.engine
            .add_message(
                &group_key(group_id),
                GroupMessage::new(sender_id, sender_name, role, content),
            )
            .await;
    }

    /// Assembles the provider message list for the group's next completion.
    /// With shared context disabled the result is exactly the system prompt
    /// and the new user message, no matter how much history is stored.
    pub async fn build_group_context_messages(
        &self,
        group_id: &str,
        system_prompt: &str,
        user_message: &str,
    ) -> Vec<ChatMessage> {
        let include_history = self.shared_context_enabled(group_id).await;
        self.engine
            .build_prompt(&group_key(group_id), system_prompt, user_message, include_history)
            .await
    }

    pub async fn get_or_create(&self, group_id: &str) -> ContextState<GroupMessage> {
        self.engine.get_or_create(&group_key(group_id)).await
    }

    pub async fn clear_history(&self, group_id: &str) {
        self.engine.clear_history(&group_key(group_id)).await;
    }

    pub async fn set_persona(&self, group_id: &str, persona: &str) {
        self.engine.set_persona(&group_key(group_id), persona).await;
    }

    pub async fn stats(&self, group_id: &str) -> Option<ContextStats> {
        self.engine.stats(&group_key(group_id)).await
    }

    pub async fn cleanup_expired(&self) -> usize {
        self.engine.cleanup_expired().await
    }

    pub async fn remove_older_than(&self, cutoff: Duration) -> usize {
        self.engine.remove_older_than(cutoff).await
    }
}
