//! Plain chat messages → the chat service.

use std::sync::Arc;

use async_trait::async_trait;
use pbot_core::{InboundMessage, Result, Session};

use crate::handler::{Handler, HandlerResponse};
use crate::service::ChatService;

/// Terminal handler: forwards non-command text to [`ChatService::chat`] and
/// replies with the model's answer. Sits after [`crate::CommandHandler`] in
/// the chain.
pub struct ChatHandler {
    service: Arc<ChatService>,
}

impl ChatHandler {
    pub fn new(service: Arc<ChatService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Handler for ChatHandler {
    async fn handle(
        &self,
        session: &dyn Session,
        message: &InboundMessage,
    ) -> Result<HandlerResponse> {
        let text = message.content.trim();
        if text.is_empty() || text.starts_with('/') {
            return Ok(HandlerResponse::Ignore);
        }
        let reply = self.service.chat(session, text).await?;
        Ok(HandlerResponse::Reply(reply))
    }
}
