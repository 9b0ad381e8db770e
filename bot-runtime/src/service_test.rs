//! Unit tests for `ChatService`.
//!
//! Covers the chat turn (prompt assembly, history recording, failure
//! mapping), the switch-and-clear contract, per-key request serialization,
//! group routing, cached persona overview, and snapshot persistence.
//! Uses MockSession and MockCompletionClient; no network.

use std::sync::Arc;
use std::time::Duration;

use pbot_core::MessageRole;
use storage::{KvStore, SqliteKvStore};

use crate::test_support::{test_service, MockCompletionClient, MockSession};

#[tokio::test]
async fn test_chat_round_trip_records_both_sides() {
    let llm = MockCompletionClient::replying("你好！");
    let service = test_service(llm.clone());
    let session = MockSession::user("u1");

    let reply = service.chat(&session, "在吗").await.expect("chat");
    assert_eq!(reply, "你好！");

    let stats = service.store().stats("u1").await.expect("stats");
    assert_eq!(stats.message_count, 2);
    assert_eq!(stats.rounds, 1);

    // The provider saw [system, user] with the default persona's prompt.
    let calls = llm.calls().await;
    assert_eq!(calls.len(), 1);
    let (messages, params) = &calls[0];
    assert_eq!(messages[0].role, MessageRole::System);
    assert_eq!(messages.last().map(|m| m.content.as_str()), Some("在吗"));
    assert_eq!(params.model, "test-model");
}

#[tokio::test]
async fn test_chat_sends_thinking_message() {
    let llm = MockCompletionClient::replying("ok");
    let service = test_service(llm);
    let session = MockSession::user("u1");

    service.chat(&session, "hi").await.expect("chat");
    assert_eq!(session.sent().await, vec!["思考中…".to_string()]);
}

#[tokio::test]
async fn test_empty_prompt_rejected_without_side_effects() {
    let llm = MockCompletionClient::replying("ok");
    let service = test_service(llm.clone());
    let session = MockSession::user("u1");

    let reply = service.chat(&session, "   ").await.expect("chat");
    assert_eq!(reply, "请输入要对话的内容。");
    assert!(llm.calls().await.is_empty());
    assert!(service.store().stats("u1").await.is_none());
}

#[tokio::test]
async fn test_provider_failure_maps_to_user_message_and_keeps_user_turn() {
    let llm = MockCompletionClient::rate_limited();
    let service = test_service(llm);
    let session = MockSession::user("u1");

    let reply = service.chat(&session, "hi").await.expect("chat");
    assert_eq!(reply, "请求太频繁了，请稍后再试。");

    // The user message was stored before the call; no assistant reply joins
    // it, so rounds and message count agree at one.
    let stats = service.store().stats("u1").await.expect("stats");
    assert_eq!(stats.message_count, 1);
    assert_eq!(stats.rounds, 1);
}

#[tokio::test]
async fn test_switch_persona_clears_history_and_changes_prompt() {
    let llm = MockCompletionClient::replying("ok");
    let service = test_service(llm.clone());
    let session = MockSession::user("u1");

    service.chat(&session, "first").await.expect("chat");
    let persona = service
        .switch_persona(&session, "诗人")
        .await
        .expect("switch resolves");
    assert_eq!(persona.name, "poet");
    assert_eq!(persona.greeting, "且听风吟。想写点什么？");

    let stats = service.store().stats("u1").await.expect("stats");
    assert_eq!(stats.message_count, 0);
    assert_eq!(stats.persona, "poet");

    // The next turn speaks with the poet's system prompt and sampling params.
    service.chat(&session, "写一首诗").await.expect("chat");
    let calls = llm.calls().await;
    let (messages, params) = calls.last().expect("second call");
    assert_eq!(messages[0].content, persona.system_prompt);
    assert_eq!(params.temperature, persona.temperature);
    assert_eq!(params.max_tokens, persona.max_tokens);
}

#[tokio::test]
async fn test_switch_persona_unknown_leaves_history() {
    let llm = MockCompletionClient::replying("ok");
    let service = test_service(llm);
    let session = MockSession::user("u1");

    service.chat(&session, "first").await.expect("chat");
    assert!(service.switch_persona(&session, "nonexistent").await.is_none());
    let stats = service.store().stats("u1").await.expect("stats");
    assert_eq!(stats.message_count, 2);
}

#[tokio::test]
async fn test_same_key_completions_are_serialized() {
    let llm = MockCompletionClient::slow("ok", Duration::from_millis(50));
    let service = test_service(llm.clone());
    let a = MockSession::user("u1");
    let b = MockSession::user("u1");

    let (ra, rb) = tokio::join!(service.chat(&a, "one"), service.chat(&b, "two"));
    ra.expect("chat");
    rb.expect("chat");

    assert_eq!(llm.max_in_flight(), 1);
    let stats = service.store().stats("u1").await.expect("stats");
    assert_eq!(stats.message_count, 4);
}

#[tokio::test]
async fn test_different_keys_complete_in_parallel() {
    let llm = MockCompletionClient::slow("ok", Duration::from_millis(50));
    let service = test_service(llm.clone());
    let a = MockSession::user("u1");
    let b = MockSession::user("u2");

    let (ra, rb) = tokio::join!(service.chat(&a, "one"), service.chat(&b, "two"));
    ra.expect("chat");
    rb.expect("chat");

    assert_eq!(llm.max_in_flight(), 2);
}

#[tokio::test]
async fn test_group_chat_routes_to_group_store_with_sender_tags() {
    let llm = MockCompletionClient::replying("大家好");
    let service = test_service(llm.clone());
    let session = MockSession::group("u1", "g1");

    service.chat(&session, "先说一句").await.expect("chat");

    // The sender was auto-enrolled and the history lives under the group key.
    assert!(service.groups().get_members("g1").await.contains("u1"));
    assert!(service.store().stats("u1").await.is_none());
    let stats = service.groups().stats("g1").await.expect("group stats");
    assert_eq!(stats.message_count, 2);

    // The second turn's prompt carries the tagged first exchange.
    service.chat(&session, "再说一句").await.expect("chat");
    let calls = llm.calls().await;
    let (messages, _) = calls.last().expect("second call");
    assert!(messages
        .iter()
        .any(|m| m.content == "u1-name: 先说一句"));
}

#[tokio::test]
async fn test_group_shared_context_off_drops_history_from_prompt() {
    let llm = MockCompletionClient::replying("ok");
    let service = test_service(llm.clone());
    let session = MockSession::group("u1", "g1");

    service.chat(&session, "first").await.expect("chat");
    assert!(service.set_shared_context(&session, false).await);
    service.chat(&session, "second").await.expect("chat");

    let calls = llm.calls().await;
    let (messages, _) = calls.last().expect("second call");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "second");
}

#[tokio::test]
async fn test_set_shared_context_rejected_for_private_chat() {
    let llm = MockCompletionClient::replying("ok");
    let service = test_service(llm);
    let session = MockSession::user("u1");
    assert!(!service.set_shared_context(&session, false).await);
}

#[tokio::test]
async fn test_persona_overview_is_cached_until_catalog_changes() {
    let llm = MockCompletionClient::replying("ok");
    let service = test_service(llm);

    let first = service.persona_overview().await;
    assert!(first.contains("catgirl"));
    assert!(first.contains("猫娘"));
    assert_eq!(service.cache_stats().await.entries, 1);

    // Second call is served from cache and matches.
    assert_eq!(service.persona_overview().await, first);

    // Catalog changes invalidate the memo.
    let added = service
        .add_custom_persona(persona::PersonaTemplate::new(
            "pirate",
            "海盗",
            "你是一位海盗。",
            0.8,
            512,
            "呀嘿！",
            vec![],
        ))
        .await;
    assert!(added);
    assert_eq!(service.cache_stats().await.entries, 0);
    assert!(service.persona_overview().await.contains("pirate"));
}

#[tokio::test]
async fn test_chat_persists_snapshot_when_kv_configured() {
    let kv: Arc<SqliteKvStore> = Arc::new(
        SqliteKvStore::new("sqlite::memory:")
            .await
            .expect("kv store"),
    );
    let llm = MockCompletionClient::replying("ok");
    let service = test_service(llm).with_kv_store(kv.clone());
    let session = MockSession::user("u1");

    service.chat(&session, "hi").await.expect("chat");

    let record = kv
        .load("conversation", "u1")
        .await
        .expect("load")
        .expect("snapshot present");
    let messages = record
        .get("messages")
        .and_then(|m| m.as_array())
        .expect("messages array");
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn test_group_chat_persists_under_group_namespace() {
    let kv: Arc<SqliteKvStore> = Arc::new(
        SqliteKvStore::new("sqlite::memory:")
            .await
            .expect("kv store"),
    );
    let llm = MockCompletionClient::replying("ok");
    let service = test_service(llm).with_kv_store(kv.clone());
    let session = MockSession::group("u1", "g1");

    service.chat(&session, "hi").await.expect("chat");

    assert!(kv
        .load("group", "group_g1")
        .await
        .expect("load")
        .is_some());
}

#[tokio::test]
async fn test_restore_context_round_trip() {
    let kv: Arc<SqliteKvStore> = Arc::new(
        SqliteKvStore::new("sqlite::memory:")
            .await
            .expect("kv store"),
    );
    let llm = MockCompletionClient::replying("ok");
    let service = test_service(llm).with_kv_store(kv.clone());
    let session = MockSession::user("u1");
    service.chat(&session, "hi").await.expect("chat");

    // A second service over the same store starts empty and rehydrates.
    let revived = test_service(MockCompletionClient::replying("ok")).with_kv_store(kv);
    assert!(revived.store().stats("u1").await.is_none());
    assert!(revived.restore_context(&session).await.expect("restore"));

    let stats = revived.store().stats("u1").await.expect("stats");
    assert_eq!(stats.message_count, 2);
    assert_eq!(stats.rounds, 1);
}

#[tokio::test]
async fn test_restore_context_without_kv_or_snapshot_is_false() {
    let session = MockSession::user("u1");

    let bare = test_service(MockCompletionClient::replying("ok"));
    assert!(!bare.restore_context(&session).await.expect("restore"));

    let kv: Arc<SqliteKvStore> = Arc::new(
        SqliteKvStore::new("sqlite::memory:")
            .await
            .expect("kv store"),
    );
    let empty = test_service(MockCompletionClient::replying("ok")).with_kv_store(kv);
    assert!(!empty.restore_context(&session).await.expect("restore"));
}

#[tokio::test]
async fn test_restore_context_drops_malformed_snapshot() {
    let kv: Arc<SqliteKvStore> = Arc::new(
        SqliteKvStore::new("sqlite::memory:")
            .await
            .expect("kv store"),
    );
    kv.save("conversation", "u1", &serde_json::json!({"not": "a context"}))
        .await
        .expect("save");

    let service = test_service(MockCompletionClient::replying("ok")).with_kv_store(kv.clone());
    let session = MockSession::user("u1");

    // The corrupt record is dropped, not retried; the key starts fresh.
    assert!(!service.restore_context(&session).await.expect("restore"));
    assert!(kv
        .load("conversation", "u1")
        .await
        .expect("load")
        .is_none());
}

#[tokio::test]
async fn test_run_maintenance_does_not_disturb_fresh_state() {
    let llm = MockCompletionClient::replying("ok");
    let service = test_service(llm);
    let session = MockSession::user("u1");

    service.chat(&session, "hi").await.expect("chat");
    service.run_maintenance().await;

    assert!(service.store().stats("u1").await.is_some());
}
