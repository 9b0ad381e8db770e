//! pbot: interactive entry point for the persona chat bot.
//!
//! Reads lines from stdin as one local session and prints replies; `exit`
//! quits. Configuration comes from the environment (`.env` supported).

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bot_runtime::{
    ChatHandler, ChatService, CommandHandler, EnvChatConfig, HandlerChain, HandlerResponse,
    LoggingMiddleware,
};
use clap::{Parser, Subcommand};
use conversation::{ConversationStore, GroupSessionManager};
use llm_client::{EnvLlmConfig, OpenAICompletionClient};
use pbot_core::{init_tracing, InboundMessage, Session};
use persona::{PersonaCatalog, PersonaManager};
use storage::{KvStore, SqliteKvStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use ttl_cache::TtlCache;

#[derive(Parser)]
#[command(name = "pbot", about = "Persona chat bot CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive chat session on stdin/stdout.
    Run {
        /// User id for this session.
        #[arg(long, default_value = "local")]
        user: String,
        /// Group id to simulate a group conversation.
        #[arg(long)]
        group: Option<String>,
    },
}

/// Local session: identity from CLI flags, side sends go to stdout.
struct CliSession {
    user_id: String,
    group_id: Option<String>,
}

#[async_trait]
impl Session for CliSession {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    async fn send(&self, content: &str) -> pbot_core::Result<()> {
        println!("[bot] {}", content);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let log_file = std::env::var("LOG_FILE").ok();
    init_tracing(log_file.as_deref())?;

    match cli.command {
        Commands::Run { user, group } => run_chat(user, group).await,
    }
}

async fn run_chat(user: String, group: Option<String>) -> Result<()> {
    let llm_config = EnvLlmConfig::from_env()?;
    let chat_config = EnvChatConfig::from_env();

    let catalog = Arc::new(PersonaCatalog::new(chat_config.persona_set));
    let personas = PersonaManager::new(catalog, chat_config.default_persona.clone());
    let store = ConversationStore::new(chat_config.context_config());
    let groups = GroupSessionManager::new(chat_config.context_config(), chat_config.group_config());
    let cache = TtlCache::new(chat_config.cache_capacity, chat_config.cache_ttl_config());
    let llm = Arc::new(OpenAICompletionClient::with_base_url(
        llm_config.api_key.clone(),
        llm_config.base_url.clone(),
    ));

    let mut service = ChatService::new(
        personas,
        store,
        groups,
        cache.clone(),
        llm,
        llm_config.model.clone(),
        llm_config.thinking_message.clone(),
    );
    if let Some(url) = &chat_config.database_url {
        let kv: Arc<dyn KvStore> = Arc::new(SqliteKvStore::new(url).await?);
        service = service.with_kv_store(kv);
    }

    let maintenance = service.spawn_maintenance(chat_config.maintenance_interval());
    let cache_sweeper = cache.spawn_sweeper(chat_config.maintenance_interval());

    let service = Arc::new(service);
    let chain = HandlerChain::new()
        .add_middleware(Arc::new(LoggingMiddleware))
        .add_handler(Arc::new(CommandHandler::new(service.clone())))
        .add_handler(Arc::new(ChatHandler::new(service.clone())));

    let session = CliSession {
        user_id: user,
        group_id: group,
    };

    // Pick up where the last run left off, if a snapshot survives.
    match service.restore_context(&session).await {
        Ok(true) => println!("已恢复上次的会话上下文。"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "Snapshot restore failed"),
    }

    println!("pbot 已启动，输入内容开始对话，/personas 查看人格，exit 退出。");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "exit" || text == "quit" {
            break;
        }

        let message = InboundMessage::new(
            session.user_id.clone(),
            None,
            session.group_id.clone(),
            text,
        );
        match chain.handle(&session, &message).await {
            Ok(HandlerResponse::Reply(reply)) => println!("{}", reply),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Message handling failed"),
        }
    }

    maintenance.abort();
    cache_sweeper.abort();
    Ok(())
}
