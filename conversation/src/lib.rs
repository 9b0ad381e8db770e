//! # Conversation state
//!
//! Per-conversation history with token-budget prompt assembly.
//!
//! ## Modules
//!
//! - [`tokens`] – weighted character-class token estimation
//! - [`types`] – stored message, group envelope, context state, stats
//! - [`engine`] – generic [`ContextEngine`]: idle-expiry recreation, bounded
//!   history, token-budget truncation, sweeps
//! - [`store`] – [`ConversationStore`] for 1:1 conversations
//! - [`group`] – [`GroupSessionManager`]: membership, reverse index, shared
//!   context toggle
//!
//! The same engine drives both 1:1 and group conversations; the two layers
//! differ only in their message envelope and surrounding bookkeeping.

pub mod config;
pub mod engine;
pub mod group;
pub mod store;
pub mod tokens;
pub mod types;




pub use config::ContextConfig;
pub use engine::ContextEngine;
pub use group::{group_key, GroupConfig, GroupSessionManager};
pub use store::ConversationStore;
pub use tokens::estimate_tokens;
pub use types::{ContextState, ContextStats, Envelope, GroupMessage, StoredMessage};
