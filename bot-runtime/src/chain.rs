//! Handler chain: middleware before, handlers in order, middleware after in
//! reverse. The first handler that returns Stop or Reply ends the handler
//! phase.

use std::sync::Arc;

use pbot_core::{InboundMessage, Result, Session};
use tracing::{debug, info};

use crate::handler::{Handler, HandlerResponse, Middleware};

#[derive(Clone, Default)]
pub struct HandlerChain {
    middleware: Vec<Arc<dyn Middleware>>,
    handlers: Vec<Arc<dyn Handler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self {
            middleware: Vec::new(),
            handlers: Vec::new(),
        }
    }

    pub fn add_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn add_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Runs the chain for one message and returns the final response.
    pub async fn handle(
        &self,
        session: &dyn Session,
        message: &InboundMessage,
    ) -> Result<HandlerResponse> {
        for mw in &self.middleware {
            if !mw.before(message).await? {
                info!(user_id = %message.user_id, "Chain stopped by middleware");
                return Ok(HandlerResponse::Stop);
            }
        }

        let mut final_response = HandlerResponse::Continue;
        for handler in &self.handlers {
            let response = handler.handle(session, message).await?;
            debug!(
                handler = std::any::type_name_of_val(handler.as_ref()),
                response = ?response,
                "Handler processed"
            );
            match response {
                HandlerResponse::Stop | HandlerResponse::Reply(_) => {
                    final_response = response;
                    break;
                }
                HandlerResponse::Continue | HandlerResponse::Ignore => continue,
            }
        }

        for mw in self.middleware.iter().rev() {
            mw.after(message, &final_response).await?;
        }

        Ok(final_response)
    }
}
