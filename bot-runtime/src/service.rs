//! The chat service: one instance owns every state singleton and serves all
//! request handlers by handle.
//!
//! ## Concurrency
//!
//! Data-model operations are synchronous critical sections; the only real
//! suspension point is the outbound completion call. Two in-flight
//! completions for the same conversation key must not interleave their
//! read-build-complete-write sequences, so `chat` serializes per key with a
//! keyed `Mutex`. Different keys proceed in parallel.
//!
//! ## Persistence
//!
//! Snapshots are written after mutation when a [`KvStore`] is configured.
//! Strictly best-effort: a storage failure is logged and the in-memory path
//! continues.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use conversation::{
    group_key, ContextState, ContextStats, ConversationStore, GroupMessage,
    GroupSessionManager, StoredMessage,
};
use llm_client::{CompletionClient, CompletionParams};
use pbot_core::{BotError, MessageRole, Result, Session};
use persona::{PersonaManager, PersonaTemplate};
use storage::KvStore;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use ttl_cache::{namespaces, CacheStats, TtlCache};

const NS_CONVERSATION: &str = "conversation";
const NS_GROUP: &str = "group";

#[derive(Clone)]
pub struct ChatService {
    personas: PersonaManager,
    store: ConversationStore,
    groups: GroupSessionManager,
    cache: TtlCache<String>,
    llm: Arc<dyn CompletionClient>,
    kv: Option<Arc<dyn KvStore>>,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    model: String,
    thinking_message: String,
}

impl ChatService {
    pub fn new(
        personas: PersonaManager,
        store: ConversationStore,
        groups: GroupSessionManager,
        cache: TtlCache<String>,
        llm: Arc<dyn CompletionClient>,
        model: impl Into<String>,
        thinking_message: impl Into<String>,
    ) -> Self {
        Self {
            personas,
            store,
            groups,
            cache,
            llm,
            kv: None,
            locks: Arc::new(Mutex::new(HashMap::new())),
            model: model.into(),
            thinking_message: thinking_message.into(),
        }
    }

    /// Enables best-effort persistence of context snapshots.
    pub fn with_kv_store(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn personas(&self) -> &PersonaManager {
        &self.personas
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn groups(&self) -> &GroupSessionManager {
        &self.groups
    }

    /// Runs one chat turn: build the prompt from persona and history, call
    /// the provider, record both sides of the exchange, and return the reply
    /// text.
    ///
    /// Expected failures never surface as errors: an empty prompt gets a
    /// rejection reply, and a classified provider failure gets its localized
    /// user message while the raw detail goes to logs. The user message is
    /// stored before the provider call, so a failed turn keeps it.
    #[instrument(skip(self, session, prompt))]
    pub async fn chat(&self, session: &dyn Session, prompt: &str) -> Result<String> {
        let text = prompt.trim();
        if text.is_empty() {
            return Ok("请输入要对话的内容。".to_string());
        }

        let key = conversation_key(session);
        let lock = self.conversation_lock(&key).await;
        let _guard = lock.lock().await;

        let persona = self.personas.current(session.user_id()).await;
        info!(
            user_id = %session.user_id(),
            persona = %persona.name,
            group = session.group_id().is_some(),
            "Chat turn started"
        );

        if !self.thinking_message.is_empty() {
            if let Err(e) = session.send(&self.thinking_message).await {
                warn!(error = %e, "Failed to send thinking message");
            }
        }

        let sender_name = session
            .username()
            .unwrap_or_else(|| session.user_id())
            .to_string();

        let messages = match session.group_id() {
            Some(group_id) => {
                // A sender is implicitly a member; rejection past the cap is
                // logged by the group layer and the chat proceeds.
                self.groups.add_member(group_id, session.user_id()).await;
                self.groups
                    .build_group_context_messages(group_id, &persona.system_prompt, text)
                    .await
            }
            None => {
                self.store
                    .build_context_messages(&key, &persona.system_prompt, text)
                    .await
            }
        };

        match session.group_id() {
            Some(group_id) => {
                self.groups
                    .add_group_message(
                        group_id,
                        session.user_id(),
                        &sender_name,
                        MessageRole::User,
                        text,
                    )
                    .await
            }
            None => self.store.add_user_message(&key, text).await,
        }

        let params = CompletionParams {
            model: self.model.clone(),
            temperature: persona.temperature,
            max_tokens: persona.max_tokens,
        };

        let reply = match self.llm.complete(messages, &params).await {
            Ok(reply) => {
                match session.group_id() {
                    Some(group_id) => {
                        self.groups
                            .add_group_message(
                                group_id,
                                "assistant",
                                &persona.name,
                                MessageRole::Assistant,
                                &reply,
                            )
                            .await
                    }
                    None => self.store.add_assistant_message(&key, &reply).await,
                }
                reply
            }
            Err(e) => {
                error!(user_id = %session.user_id(), error = %e, "Completion failed");
                e.user_message().to_string()
            }
        };

        self.persist(session).await;
        Ok(reply)
    }

    /// Switches the user's persona and clears the conversation.
    ///
    /// Resolving and storing the selection is the persona manager's job;
    /// clearing history on a successful switch is this caller's explicit
    /// contract, so a new persona never inherits the old one's context.
    /// Returns the template (for its greeting) or `None` when nothing
    /// resolves.
    #[instrument(skip(self, session))]
    pub async fn switch_persona(
        &self,
        session: &dyn Session,
        name_or_alias: &str,
    ) -> Option<PersonaTemplate> {
        if !self.personas.switch(session.user_id(), name_or_alias).await {
            return None;
        }
        let persona = self.personas.current(session.user_id()).await;

        match session.group_id() {
            Some(group_id) => {
                self.groups.clear_history(group_id).await;
                self.groups.set_persona(group_id, &persona.name).await;
            }
            None => {
                let key = conversation_key(session);
                self.store.clear_history(&key).await;
                self.store.set_persona(&key, &persona.name).await;
            }
        }
        self.persist(session).await;
        Some(persona)
    }

    /// Formatted persona listing with aliases, memoized in the persona cache
    /// tier until a custom persona changes the catalog.
    pub async fn persona_overview(&self) -> String {
        if let Some(text) = self.cache.get(namespaces::PERSONA, "overview").await {
            return text;
        }

        let mut out = String::from("可用人格：\n");
        for template in self.personas.catalog().list().await {
            let aliases = self.personas.catalog().list_aliases(&template.name);
            out.push_str(&format!(
                "- {}（{}）",
                template.name, template.description
            ));
            if !aliases.is_empty() {
                out.push_str(&format!("别名: {}", aliases.join("、")));
            }
            out.push('\n');
        }
        out.push_str("使用 /persona <名称> 切换。");

        self.cache
            .set(namespaces::PERSONA, "overview", out.clone(), None)
            .await;
        out
    }

    /// The named persona, or the user's current one when `name` is empty.
    pub async fn persona_info(
        &self,
        session: &dyn Session,
        name: Option<&str>,
    ) -> Option<PersonaTemplate> {
        match name {
            Some(name) => self.personas.catalog().resolve(name).await,
            None => Some(self.personas.current(session.user_id()).await),
        }
    }

    pub async fn add_custom_persona(&self, template: PersonaTemplate) -> bool {
        let added = self.personas.add_custom(template).await;
        if added {
            self.cache.clear_namespace(namespaces::PERSONA).await;
        }
        added
    }

    pub async fn remove_custom_persona(&self, name: &str) -> bool {
        let removed = self.personas.remove_custom(name).await;
        if removed {
            self.cache.clear_namespace(namespaces::PERSONA).await;
        }
        removed
    }

    /// Clears the session's conversation history.
    pub async fn clear_context(&self, session: &dyn Session) {
        match session.group_id() {
            Some(group_id) => self.groups.clear_history(group_id).await,
            None => self.store.clear_history(&conversation_key(session)).await,
        }
        self.persist(session).await;
    }

    /// Rehydrates the session's conversation from its persisted snapshot.
    /// Returns true when a context was installed.
    ///
    /// Serves startup tooling; the request path never depends on it. A
    /// storage failure propagates so the caller can log and continue. A
    /// record that no longer deserializes is fatal to that key only: it is
    /// dropped and the conversation starts fresh.
    pub async fn restore_context(&self, session: &dyn Session) -> Result<bool> {
        let Some(kv) = &self.kv else {
            return Ok(false);
        };

        match session.group_id() {
            Some(group_id) => {
                let key = group_key(group_id);
                let Some(value) = kv
                    .load(NS_GROUP, &key)
                    .await
                    .map_err(|e| BotError::Storage(e.to_string()))?
                else {
                    return Ok(false);
                };
                match serde_json::from_value::<ContextState<GroupMessage>>(value) {
                    Ok(state) => {
                        self.groups.engine().restore(&key, state).await;
                        info!(key = %key, "Group context restored from snapshot");
                        Ok(true)
                    }
                    Err(e) => self.drop_malformed(kv.as_ref(), NS_GROUP, &key, e).await,
                }
            }
            None => {
                let key = session.user_id().to_string();
                let Some(value) = kv
                    .load(NS_CONVERSATION, &key)
                    .await
                    .map_err(|e| BotError::Storage(e.to_string()))?
                else {
                    return Ok(false);
                };
                match serde_json::from_value::<ContextState<StoredMessage>>(value) {
                    Ok(state) => {
                        self.store.engine().restore(&key, state).await;
                        info!(key = %key, "Context restored from snapshot");
                        Ok(true)
                    }
                    Err(e) => {
                        self.drop_malformed(kv.as_ref(), NS_CONVERSATION, &key, e)
                            .await
                    }
                }
            }
        }
    }

    pub async fn context_stats(&self, session: &dyn Session) -> Option<ContextStats> {
        match session.group_id() {
            Some(group_id) => self.groups.stats(group_id).await,
            None => self.store.stats(&conversation_key(session)).await,
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Toggles shared context for the session's group. Returns false for 1:1
    /// sessions, where the toggle does not apply.
    pub async fn set_shared_context(&self, session: &dyn Session, enabled: bool) -> bool {
        match session.group_id() {
            Some(group_id) => {
                self.groups.set_shared_context(group_id, enabled).await;
                true
            }
            None => false,
        }
    }

    /// One maintenance pass: idle-context cleanup on both stores, cache
    /// purge, and the persistence retention sweep.
    pub async fn run_maintenance(&self) {
        let idle = self.store.cleanup_expired().await + self.groups.cleanup_expired().await;
        let purged = self.cache.purge_expired().await;
        info!(idle_contexts = idle, cache_entries = purged, "Maintenance pass");

        if let Some(kv) = &self.kv {
            let cutoff = Utc::now() - self.store.engine().config().retention;
            for namespace in [NS_CONVERSATION, NS_GROUP] {
                if let Err(e) = kv.sweep_older_than(namespace, cutoff).await {
                    warn!(namespace = %namespace, error = %e, "Retention sweep failed");
                }
            }
        }
    }

    /// Spawns the periodic maintenance task. Runs until aborted.
    pub fn spawn_maintenance(&self, every: StdDuration) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so startup stays quiet.
            interval.tick().await;
            loop {
                interval.tick().await;
                service.run_maintenance().await;
            }
        })
    }

    /// A snapshot that fails to deserialize is removed rather than retried
    /// forever; the in-memory context simply starts fresh.
    async fn drop_malformed(
        &self,
        kv: &dyn KvStore,
        namespace: &str,
        key: &str,
        cause: serde_json::Error,
    ) -> Result<bool> {
        warn!(namespace = %namespace, key = %key, error = %cause, "Dropping malformed snapshot");
        kv.remove(namespace, key)
            .await
            .map_err(|e| BotError::Storage(e.to_string()))?;
        Ok(false)
    }

    async fn conversation_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Best-effort snapshot write; failures are logged and swallowed.
    async fn persist(&self, session: &dyn Session) {
        let Some(kv) = &self.kv else {
            return;
        };

        let (namespace, key, snapshot) = match session.group_id() {
            Some(group_id) => {
                let key = group_key(group_id);
                let snapshot = self
                    .groups
                    .engine()
                    .snapshot(&key)
                    .await
                    .map(|state| serde_json::to_value(&state));
                (NS_GROUP, key, snapshot)
            }
            None => {
                let key = session.user_id().to_string();
                let snapshot = self
                    .store
                    .engine()
                    .snapshot(&key)
                    .await
                    .map(|state| serde_json::to_value(&state));
                (NS_CONVERSATION, key, snapshot)
            }
        };

        match snapshot {
            Some(Ok(value)) => {
                if let Err(e) = kv.save(namespace, &key, &value).await {
                    warn!(namespace = %namespace, key = %key, error = %e, "Persist failed");
                }
            }
            Some(Err(e)) => {
                warn!(namespace = %namespace, key = %key, error = %e, "Snapshot serialization failed");
            }
            None => {}
        }
    }
}

fn conversation_key(session: &dyn Session) -> String {
    match session.group_id() {
        Some(group_id) => group_key(group_id),
        None => session.user_id().to_string(),
    }
}
