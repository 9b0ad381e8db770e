//! Command surface: slash verbs mapped onto service operations.
//!
//! Each verb is a thin adapter — parse arguments, call the service, format a
//! text reply. Anything that is not a slash command falls through to the chat
//! handler.

use std::sync::Arc;

use async_trait::async_trait;
use pbot_core::{InboundMessage, Result, Session};
use persona::PersonaTemplate;
use tracing::info;

use crate::handler::{Handler, HandlerResponse};
use crate::service::ChatService;

pub struct CommandHandler {
    service: Arc<ChatService>,
}

impl CommandHandler {
    pub fn new(service: Arc<ChatService>) -> Self {
        Self { service }
    }

    async fn switch_persona(&self, session: &dyn Session, name: &str) -> String {
        if name.is_empty() {
            return "用法：/persona <名称>，使用 /personas 查看可用人格。".to_string();
        }
        match self.service.switch_persona(session, name).await {
            Some(template) => template.greeting,
            None => format!("未找到人格「{}」，使用 /personas 查看可用人格。", name),
        }
    }

    async fn persona_info(&self, session: &dyn Session, name: Option<&str>) -> String {
        match self.service.persona_info(session, name).await {
            Some(template) => format_persona(&template, self.service.personas()),
            None => format!(
                "未找到人格「{}」，使用 /personas 查看可用人格。",
                name.unwrap_or_default()
            ),
        }
    }

    async fn add_persona(&self, args: &str) -> String {
        // name|description|system prompt
        let parts: Vec<&str> = args.splitn(3, '|').map(str::trim).collect();
        if parts.len() < 3 || parts.iter().any(|p| p.is_empty()) {
            return "用法：/persona_add 名称|描述|系统提示词".to_string();
        }
        let template = PersonaTemplate::new(
            parts[0],
            parts[1],
            parts[2],
            0.8,
            1024,
            format!("人格「{}」已上线。", parts[0]),
            Vec::new(),
        );
        if self.service.add_custom_persona(template).await {
            format!("自定义人格「{}」已创建。", parts[0])
        } else {
            format!("人格「{}」已存在，换个名字试试。", parts[0])
        }
    }

    async fn remove_persona(&self, name: &str) -> String {
        if name.is_empty() {
            return "用法：/persona_del <名称>".to_string();
        }
        if self.service.remove_custom_persona(name).await {
            format!("自定义人格「{}」已删除。", name)
        } else {
            format!("无法删除「{}」：内置人格受保护，或该人格不存在。", name)
        }
    }

    async fn context_stats(&self, session: &dyn Session) -> String {
        match self.service.context_stats(session).await {
            Some(stats) => format!(
                "当前人格：{}\n消息数：{}\n对话轮数：{}\n累计 token：{}\n最近活跃：{}",
                stats.persona,
                stats.message_count,
                stats.rounds,
                stats.total_tokens,
                stats.updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            ),
            None => "当前没有会话上下文。".to_string(),
        }
    }

    async fn cache_report(&self) -> String {
        let stats = self.service.cache_stats().await;
        let mut out = format!("缓存条目：{}", stats.entries);
        let mut tiers: Vec<_> = stats.per_namespace.iter().collect();
        tiers.sort();
        for (namespace, count) in tiers {
            out.push_str(&format!("\n- {}: {}", namespace, count));
        }
        out
    }

    async fn shared_context(&self, session: &dyn Session, arg: &str) -> String {
        let enabled = match arg {
            "on" => true,
            "off" => false,
            _ => return "用法：/shared on|off".to_string(),
        };
        if self.service.set_shared_context(session, enabled).await {
            if enabled {
                "群聊共享上下文已开启。".to_string()
            } else {
                "群聊共享上下文已关闭。".to_string()
            }
        } else {
            "该指令仅在群聊中可用。".to_string()
        }
    }
}

#[async_trait]
impl Handler for CommandHandler {
    async fn handle(
        &self,
        session: &dyn Session,
        message: &InboundMessage,
    ) -> Result<HandlerResponse> {
        let text = message.content.trim();
        if !text.starts_with('/') {
            return Ok(HandlerResponse::Continue);
        }

        let mut parts = text.splitn(2, char::is_whitespace);
        let verb = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or("").trim();
        info!(user_id = %message.user_id, verb = %verb, "Command received");

        let reply = match verb {
            "/personas" => self.service.persona_overview().await,
            "/persona" => self.switch_persona(session, rest).await,
            "/persona_info" => {
                self.persona_info(session, (!rest.is_empty()).then_some(rest))
                    .await
            }
            "/persona_add" => self.add_persona(rest).await,
            "/persona_del" => self.remove_persona(rest).await,
            "/clear" => {
                self.service.clear_context(session).await;
                "上下文已清除。".to_string()
            }
            "/stats" => self.context_stats(session).await,
            "/cache" => self.cache_report().await,
            "/shared" => self.shared_context(session, rest).await,
            _ => "未知指令。可用：/personas /persona /persona_info /persona_add \
                  /persona_del /clear /stats /cache /shared"
                .to_string(),
        };
        Ok(HandlerResponse::Reply(reply))
    }
}

fn format_persona(template: &PersonaTemplate, personas: &persona::PersonaManager) -> String {
    let aliases = personas.catalog().list_aliases(&template.name);
    let mut out = format!(
        "人格：{}\n描述：{}\n温度：{}\n回复上限：{} tokens",
        template.name, template.description, template.temperature, template.max_tokens,
    );
    if !template.traits.is_empty() {
        out.push_str(&format!("\n特质：{}", template.traits.join("、")));
    }
    if !aliases.is_empty() {
        out.push_str(&format!("\n别名：{}", aliases.join("、")));
    }
    out
}
