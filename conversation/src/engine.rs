//! # Context engine
//!
//! Generic per-key conversation state: read-triggered idle expiry, pair-bounded
//! history retention, token-budget prompt assembly, and explicit sweeps. The
//! 1:1 store and the group layer are thin instantiations of this engine with
//! different message envelopes, so the bounding and truncation rules cannot
//! drift apart between them.
//!
//! ## Expiry model
//!
//! Two independent mechanisms:
//!
//! - **Idle recreation** (read-triggered): any access through
//!   [`ContextEngine::get_or_create`] or a mutation entry point replaces a
//!   context whose `updated_at` is older than `idle_timeout`. History silently
//!   vanishes after the idle period; stale state is discarded, never merged.
//! - **Sweeps** (explicitly invoked): [`ContextEngine::cleanup_expired`] drops
//!   idle contexts whose keys are never re-accessed;
//!   [`ContextEngine::remove_older_than`] applies the longer retention cutoff.
//!   Both operate on a key snapshot and re-check timestamps under the write
//!   lock, so they tolerate concurrent request traffic.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use pbot_core::{ChatMessage, MessageRole};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::ContextConfig;
use crate::tokens::estimate_tokens;
use crate::types::{ContextState, ContextStats, Envelope};

/// Generic conversation context engine, keyed by conversation key.
#[derive(Clone)]
pub struct ContextEngine<E> {
    contexts: Arc<RwLock<HashMap<String, ContextState<E>>>>,
    config: ContextConfig,
}

impl<E: Envelope> ContextEngine<E> {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            contexts: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Returns a snapshot of the context for `key`, creating or recreating it
    /// first when absent or idle past the timeout.
    ///
    /// Idle expiry is read-triggered: a stale context survives in the map
    /// until the next access, at which point it is replaced wholesale by a
    /// fresh one (empty history, default persona, fresh timestamps).
    pub async fn get_or_create(&self, key: &str) -> ContextState<E> {
        let mut contexts = self.contexts.write().await;
        self.ensure_fresh(&mut contexts, key).clone()
    }

    /// Appends a message: stamps insertion time, estimates and caches its
    /// token count, bumps `updated_at`, then trims the history to the pair
    /// bound by dropping oldest-first.
    pub async fn add_message(&self, key: &str, mut envelope: E) {
        let now = Utc::now();
        {
            let msg = envelope.message_mut();
            msg.timestamp = now;
            msg.tokens = Some(estimate_tokens(&msg.content) as u32);
        }

        let mut contexts = self.contexts.write().await;
        let ctx = self.ensure_fresh(&mut contexts, key);
        ctx.messages.push(envelope);
        ctx.updated_at = now;

        // Stored history is bounded independently of the prompt token budget.
        let bound = self.config.max_history * 2;
        if ctx.messages.len() > bound {
            let excess = ctx.messages.len() - bound;
            ctx.messages.drain(0..excess);
            debug!(key = %key, dropped = excess, "History trimmed to pair bound");
        }
    }

    /// Empties the history, keeping persona and creation time; bumps `updated_at`.
    pub async fn clear_history(&self, key: &str) {
        let mut contexts = self.contexts.write().await;
        let ctx = self.ensure_fresh(&mut contexts, key);
        ctx.messages.clear();
        ctx.updated_at = Utc::now();
    }

    /// Binds a persona name to this conversation.
    pub async fn set_persona(&self, key: &str, persona: &str) {
        let mut contexts = self.contexts.write().await;
        let ctx = self.ensure_fresh(&mut contexts, key);
        ctx.persona = persona.to_string();
        ctx.updated_at = Utc::now();
    }

    /// Assembles `[system, ...history, user]` and applies the token budget.
    ///
    /// History is included only when `include_history` is true. Truncation
    /// walks the assembled list from the end backward accumulating token
    /// counts and stops adding earlier messages once the running total would
    /// exceed the budget; the system message at index 0 is always kept. The
    /// result preserves chronological order with no mid-list gaps, so the
    /// most recent exchanges and the system prompt survive.
    pub async fn build_prompt(
        &self,
        key: &str,
        system_prompt: &str,
        user_message: &str,
        include_history: bool,
    ) -> Vec<ChatMessage> {
        let mut items: Vec<(usize, ChatMessage)> = Vec::new();
        items.push((
            estimate_tokens(system_prompt),
            ChatMessage::system(system_prompt),
        ));

        if include_history {
            let mut contexts = self.contexts.write().await;
            let ctx = self.ensure_fresh(&mut contexts, key);
            for envelope in &ctx.messages {
                let msg = envelope.message();
                items.push((
                    msg.token_count(),
                    ChatMessage {
                        role: msg.role,
                        content: envelope.prompt_content(),
                    },
                ));
            }
        }

        items.push((estimate_tokens(user_message), ChatMessage::user(user_message)));

        apply_token_budget(items, self.config.max_context_tokens)
    }

    /// Removes the context for `key`. Returns false when absent.
    pub async fn remove(&self, key: &str) -> bool {
        self.contexts.write().await.remove(key).is_some()
    }

    /// Explicit sweep: drops every context idle past the idle timeout.
    /// Intended to run on a periodic schedule to bound memory for keys that
    /// are never re-accessed.
    pub async fn cleanup_expired(&self) -> usize {
        self.sweep(self.config.idle_timeout).await
    }

    /// Retention sweep: drops every context whose `updated_at` predates `cutoff`.
    pub async fn remove_older_than(&self, cutoff: Duration) -> usize {
        self.sweep(cutoff).await
    }

    /// Derived statistics for one context. Purely a read; an absent key stays
    /// absent and an idle key is not recreated.
    pub async fn stats(&self, key: &str) -> Option<ContextStats> {
        let contexts = self.contexts.read().await;
        let ctx = contexts.get(key)?;
        let mut rounds = 0usize;
        let mut total_tokens = 0usize;
        for envelope in &ctx.messages {
            let msg = envelope.message();
            if msg.role == MessageRole::User {
                rounds += 1;
            }
            total_tokens += msg.token_count();
        }
        Some(ContextStats {
            message_count: ctx.messages.len(),
            rounds,
            total_tokens,
            persona: ctx.persona.clone(),
            created_at: ctx.created_at,
            updated_at: ctx.updated_at,
        })
    }

    /// Number of live contexts.
    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Read-only snapshot for persistence; `None` when the key is absent.
    pub async fn snapshot(&self, key: &str) -> Option<ContextState<E>> {
        self.contexts.read().await.get(key).cloned()
    }

    /// Installs a previously persisted context, replacing any current entry.
    pub async fn restore(&self, key: &str, state: ContextState<E>) {
        self.contexts.write().await.insert(key.to_string(), state);
    }

    /// Replaces the entry for `key` with a fresh context when it is absent or
    /// idle past the timeout, and returns it. Callers hold the write lock.
    fn ensure_fresh<'a>(
        &self,
        contexts: &'a mut HashMap<String, ContextState<E>>,
        key: &str,
    ) -> &'a mut ContextState<E> {
        let stale = matches!(
            contexts.get(key),
            Some(ctx) if Utc::now() - ctx.updated_at > self.config.idle_timeout
        );
        if stale {
            info!(key = %key, "Context idle past timeout, recreating");
            contexts.remove(key);
        }
        contexts
            .entry(key.to_string())
            .or_insert_with(|| ContextState::fresh(self.config.default_persona.clone()))
    }

    async fn sweep(&self, cutoff: Duration) -> usize {
        // Snapshot keys first; re-check under the write lock so a context
        // touched between the two phases survives.
        let candidates: Vec<String> = {
            let contexts = self.contexts.read().await;
            let now = Utc::now();
            contexts
                .iter()
                .filter(|(_, ctx)| now - ctx.updated_at > cutoff)
                .map(|(k, _)| k.clone())
                .collect()
        };

        if candidates.is_empty() {
            return 0;
        }

        let mut removed = 0usize;
        let mut contexts = self.contexts.write().await;
        let now = Utc::now();
        for key in candidates {
            if let Some(ctx) = contexts.get(&key) {
                if now - ctx.updated_at > cutoff {
                    contexts.remove(&key);
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            info!(removed, "Swept expired contexts");
        }
        removed
    }
}

/// Applies the token budget to an assembled prompt list.
///
/// Walks backward accumulating token counts; stops adding earlier entries once
/// the running total would exceed `budget`, except the element at index 0 (the
/// system message), which is always kept regardless of budget.
fn apply_token_budget(
    mut items: Vec<(usize, ChatMessage)>,
    budget: usize,
) -> Vec<ChatMessage> {
    if items.is_empty() {
        return Vec::new();
    }

    let mut tail_start = items.len();
    let mut total = 0usize;
    while tail_start > 1 {
        let tokens = items[tail_start - 1].0;
        if total + tokens > budget {
            break;
        }
        total += tokens;
        tail_start -= 1;
    }

    let tail = items.split_off(tail_start);
    let mut out = Vec::with_capacity(tail.len() + 1);
    out.push(items.swap_remove(0).1);
    out.extend(tail.into_iter().map(|(_, msg)| msg));
    out
}
