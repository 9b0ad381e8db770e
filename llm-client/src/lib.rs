//! # Completion client abstraction
//!
//! Defines the [`CompletionClient`] trait and an OpenAI-compatible
//! implementation. Transport-agnostic; the runtime talks to the provider only
//! through this trait, so tests substitute a mock without touching HTTP.
//!
//! Failures surface as [`CompletionError`] kinds with localized user-facing
//! messages; raw provider detail goes to logs only.

use async_trait::async_trait;
use pbot_core::ChatMessage;

mod config;
mod error;
mod openai;

pub use config::EnvLlmConfig;
pub use error::CompletionError;
pub use openai::{mask_token, OpenAICompletionClient};

/// Sampling parameters for one completion call, taken from the active persona.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    pub model: String,
    /// Sampling temperature, 0–2.
    pub temperature: f32,
    /// Completion token cap, > 0.
    pub max_tokens: u32,
}

/// Completion provider interface: one ordered message list in, one reply out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        params: &CompletionParams,
    ) -> Result<String, CompletionError>;
}
