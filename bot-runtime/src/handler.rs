//! Handler and middleware traits for the message chain.

use async_trait::async_trait;
use pbot_core::{InboundMessage, Result, Session};

/// Handler result for the chain. `Reply(text)` carries the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerResponse {
    /// Pass to next handler.
    Continue,
    /// Stop the chain; no response body.
    Stop,
    /// Skip this handler, try next.
    Ignore,
    /// Stop the chain and attach reply text.
    Reply(String),
}

/// Processes one inbound message. The first handler returning Stop or Reply
/// ends the handle phase.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        session: &dyn Session,
        message: &InboundMessage,
    ) -> Result<HandlerResponse>;
}

/// Cross-cutting hooks around the handler phase. `before` runs in order and
/// can stop the chain; `after` runs in reverse order with the final response.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn before(&self, _message: &InboundMessage) -> Result<bool> {
        Ok(true)
    }

    async fn after(&self, _message: &InboundMessage, _response: &HandlerResponse) -> Result<()> {
        Ok(())
    }
}
