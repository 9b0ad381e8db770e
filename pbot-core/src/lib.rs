//! # pbot-core
//!
//! Core types and traits for the persona chat bot: chat message roles, the inbound
//! message shape, the [`Session`] capability trait for the hosting framework,
//! error types, and tracing initialization. Transport-agnostic; used by every
//! other crate in the workspace.

pub mod error;
pub mod logger;
pub mod types;

pub use error::{BotError, HandlerError, Result};
pub use logger::init_tracing;
pub use types::{ChatMessage, InboundMessage, MessageRole, Session};
