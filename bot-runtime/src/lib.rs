//! # bot-runtime
//!
//! Wires the persona, conversation, cache, completion, and storage crates
//! into one chat service, and exposes the handler chain the hosting framework
//! drives for every inbound message.
//!
//! All mutable state lives in a single [`ChatService`] instance constructed at
//! startup and shared by handle; there are no ambient globals.

mod chain;
mod chat_handler;
mod command_handler;
mod config;
mod handler;
mod middleware;
mod service;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod service_test;


pub use chain::HandlerChain;
pub use chat_handler::ChatHandler;
pub use command_handler::CommandHandler;
pub use config::EnvChatConfig;
pub use handler::{Handler, HandlerResponse, Middleware};
pub use middleware::LoggingMiddleware;
pub use service::ChatService;
