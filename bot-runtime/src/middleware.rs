use async_trait::async_trait;
use pbot_core::{InboundMessage, Result};
use tracing::{debug, info};

use crate::handler::{HandlerResponse, Middleware};

/// Logs every inbound message and the final chain response.
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn before(&self, message: &InboundMessage) -> Result<bool> {
        info!(
            user_id = %message.user_id,
            username = %message.username.as_deref().unwrap_or("unknown"),
            group_id = %message.group_id.as_deref().unwrap_or("-"),
            content_len = message.content.len(),
            "Received message"
        );
        Ok(true)
    }

    async fn after(&self, message: &InboundMessage, response: &HandlerResponse) -> Result<()> {
        debug!(
            user_id = %message.user_id,
            response = ?response,
            "Processed message"
        );
        Ok(())
    }
}
