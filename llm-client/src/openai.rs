//! OpenAI-compatible completion client on async-openai.

use std::sync::Arc;

use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use pbot_core::{ChatMessage, MessageRole};
use tracing::{debug, error, info, instrument};

use crate::error::{classify, CompletionError};
use crate::{CompletionClient, CompletionParams};

/// Masks an API key for safe logging: first 7 chars + "***" + last 4 chars.
/// Keys of 11 characters or fewer become "***" outright.
pub fn mask_token(token: &str) -> String {
    let len = token.len();
    if len <= 11 {
        return "***".to_string();
    }
    format!("{}***{}", &token[..7], &token[len - 4..])
}

/// Chat-completion client for OpenAI and compatible endpoints. Wraps the
/// async-openai client; keeps the API key only for masked logging.
#[derive(Clone)]
pub struct OpenAICompletionClient {
    client: Arc<Client<async_openai::config::OpenAIConfig>>,
    api_key_for_logging: String,
}

impl OpenAICompletionClient {
    /// Builds a client against the default API base URL.
    pub fn new(api_key: String) -> Self {
        let config = async_openai::config::OpenAIConfig::new().with_api_key(api_key.clone());
        Self {
            client: Arc::new(Client::with_config(config)),
            api_key_for_logging: api_key,
        }
    }

    /// Builds a client with a custom base URL (proxies, compatible endpoints).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let config = async_openai::config::OpenAIConfig::new()
            .with_api_key(api_key.clone())
            .with_api_base(base_url);
        Self {
            client: Arc::new(Client::with_config(config)),
            api_key_for_logging: api_key,
        }
    }
}

/// Converts a single [`ChatMessage`] into the provider message format.
fn to_openai_message(msg: &ChatMessage) -> Result<ChatCompletionRequestMessage, CompletionError> {
    let content = msg.content.clone();
    let converted: ChatCompletionRequestMessage = match msg.role {
        MessageRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()
            .map_err(|e| CompletionError::Unknown(e.to_string()))?
            .into(),
        MessageRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()
            .map_err(|e| CompletionError::Unknown(e.to_string()))?
            .into(),
        MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()
            .map_err(|e| CompletionError::Unknown(e.to_string()))?
            .into(),
    };
    Ok(converted)
}

#[async_trait]
impl CompletionClient for OpenAICompletionClient {
    /// Sends a chat completion request and returns the assistant reply text.
    ///
    /// Logs the masked API key, message count, sampling parameters, and token
    /// usage. Provider failures are classified into [`CompletionError`] kinds.
    #[instrument(skip(self, messages, params))]
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        params: &CompletionParams,
    ) -> Result<String, CompletionError> {
        info!(
            model = %params.model,
            temperature = params.temperature,
            max_tokens = params.max_tokens,
            message_count = messages.len(),
            api_key = %mask_token(&self.api_key_for_logging),
            "Chat completion request"
        );

        let request_messages: Vec<ChatCompletionRequestMessage> = messages
            .iter()
            .map(to_openai_message)
            .collect::<Result<_, _>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(params.model.as_str())
            .temperature(params.temperature)
            .max_tokens(params.max_tokens)
            .messages(request_messages)
            .build()
            .map_err(|e| CompletionError::Unknown(e.to_string()))?;

        if let Ok(json) = serde_json::to_string(&request) {
            debug!(request_json = %json, "Chat completion request JSON");
        }

        let response = self.client.chat().create(request).await.map_err(|e| {
            let kind = classify(&e);
            error!(error = %e, kind = %kind, "Chat completion failed");
            kind
        })?;

        if let Some(usage) = response.usage {
            info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "Chat completion usage"
            );
        }

        match response.choices.into_iter().next() {
            Some(choice) => Ok(choice.message.content.unwrap_or_default()),
            None => Err(CompletionError::Unknown(
                "provider returned no choices".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_token_long() {
        assert_eq!(mask_token("sk-abcd1234efgh5678"), "sk-abcd***5678");
    }

    #[test]
    fn test_mask_token_short_fully_hidden() {
        assert_eq!(mask_token("short"), "***");
        assert_eq!(mask_token("exactly11ch"), "***");
    }

    #[test]
    fn test_to_openai_message_roles() {
        for msg in [
            ChatMessage::system("s"),
            ChatMessage::user("u"),
            ChatMessage::assistant("a"),
        ] {
            assert!(to_openai_message(&msg).is_ok());
        }
    }
}
