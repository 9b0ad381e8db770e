//! Shared mocks for runtime tests: a session that records sends and a
//! completion client with scripted replies. No network, no host framework.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conversation::{ContextConfig, ConversationStore, GroupConfig, GroupSessionManager};
use llm_client::{CompletionClient, CompletionError, CompletionParams};
use pbot_core::{ChatMessage, Result, Session};
use persona::{PersonaCatalog, PersonaManager, PersonaSet};
use tokio::sync::Mutex;
use ttl_cache::{CacheTtlConfig, TtlCache};

use crate::service::ChatService;

/// Session stub: fixed identity, `send` records into a vec.
pub struct MockSession {
    user_id: String,
    username: Option<String>,
    group_id: Option<String>,
    sent: Mutex<Vec<String>>,
}

impl MockSession {
    pub fn user(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: Some(format!("{}-name", user_id)),
            group_id: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn group(user_id: &str, group_id: &str) -> Self {
        Self {
            group_id: Some(group_id.to_string()),
            ..Self::user(user_id)
        }
    }

    pub async fn sent(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Session for MockSession {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    async fn send(&self, content: &str) -> Result<()> {
        self.sent.lock().await.push(content.to_string());
        Ok(())
    }
}

/// Completion client stub: fixed reply or scripted failure, optional delay,
/// records every call and tracks in-flight concurrency.
pub struct MockCompletionClient {
    reply: String,
    fail_rate_limited: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<(Vec<ChatMessage>, CompletionParams)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockCompletionClient {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            fail_rate_limited: false,
            delay: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn rate_limited() -> Arc<Self> {
        Arc::new(Self {
            fail_rate_limited: true,
            ..Self::unwrapped_replying("")
        })
    }

    pub fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::unwrapped_replying(reply)
        })
    }

    fn unwrapped_replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail_rate_limited: false,
            delay: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub async fn calls(&self) -> Vec<(Vec<ChatMessage>, CompletionParams)> {
        self.calls.lock().await.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        params: &CompletionParams,
    ) -> std::result::Result<String, CompletionError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.calls.lock().await.push((messages, params.clone()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_rate_limited {
            Err(CompletionError::RateLimited)
        } else {
            Ok(self.reply.clone())
        }
    }
}

/// A service over in-memory state and the given mock client.
pub fn test_service(llm: Arc<MockCompletionClient>) -> ChatService {
    let catalog = Arc::new(PersonaCatalog::new(PersonaSet::Simple));
    let personas = PersonaManager::new(catalog, "default");
    let store = ConversationStore::new(ContextConfig::default());
    let groups = GroupSessionManager::new(ContextConfig::default(), GroupConfig::default());
    let cache = TtlCache::new(100, CacheTtlConfig::default());
    ChatService::new(personas, store, groups, cache, llm, "test-model", "思考中…")
}
