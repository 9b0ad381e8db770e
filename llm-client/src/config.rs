//! Provider configuration loaded from environment variables.

use anyhow::{Context, Result};
use std::env;

/// OpenAI-compatible provider settings. `OPENAI_API_KEY` is required; the
/// rest default sensibly.
#[derive(Debug, Clone)]
pub struct EnvLlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Intermediate status message sent while a completion is in flight.
    pub thinking_message: String,
}

impl EnvLlmConfig {
    /// Load from environment variables. Call `dotenvy::dotenv()` first so
    /// `.env` files take effect.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")?;
        let base_url = env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = env::var("MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string());
        let thinking_message =
            env::var("THINKING_MESSAGE").unwrap_or_else(|_| "思考中…".to_string());
        Ok(Self {
            api_key,
            base_url,
            model,
            thinking_message,
        })
    }
}
