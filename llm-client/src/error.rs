//! Completion failure kinds and their classification.
//!
//! Upstream HTTP/API failures collapse into a small taxonomy the command
//! layer can map to localized user replies. Classification is best-effort
//! string/status matching; anything unrecognized lands in `Unknown` with the
//! raw detail preserved for logs.

use async_openai::error::OpenAIError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Unauthorized: invalid or missing API key")]
    Unauthorized,

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Provider server error: {0}")]
    ServerError(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Content rejected by provider policy")]
    ContentFiltered,

    #[error("Unknown provider error: {0}")]
    Unknown(String),
}

impl CompletionError {
    /// User-facing reply for this failure. Raw detail stays out of chat.
    pub fn user_message(&self) -> &'static str {
        match self {
            CompletionError::Unauthorized => "抱歉，AI 服务认证失败，请联系管理员检查 API Key。",
            CompletionError::RateLimited => "请求太频繁了，请稍后再试。",
            CompletionError::ServerError(_) => "AI 服务暂时不可用，请稍后重试。",
            CompletionError::Timeout => "AI 响应超时，请稍后重试。",
            CompletionError::ContentFiltered => "这个话题不太合适，换个问题试试吧。",
            CompletionError::Unknown(_) => "抱歉，处理您的请求时出错，请稍后重试。",
        }
    }
}

/// Maps an async-openai error into a failure kind.
pub(crate) fn classify(err: &OpenAIError) -> CompletionError {
    match err {
        OpenAIError::Reqwest(e) => {
            if e.is_timeout() {
                return CompletionError::Timeout;
            }
            match e.status() {
                Some(status) if status.as_u16() == 401 => CompletionError::Unauthorized,
                Some(status) if status.as_u16() == 429 => CompletionError::RateLimited,
                Some(status) if status.is_server_error() => {
                    CompletionError::ServerError(e.to_string())
                }
                _ => CompletionError::Unknown(e.to_string()),
            }
        }
        OpenAIError::ApiError(api) => classify_api_message(
            &api.message,
            api.r#type.as_deref().unwrap_or_default(),
        ),
        other => CompletionError::Unknown(other.to_string()),
    }
}

fn classify_api_message(message: &str, kind: &str) -> CompletionError {
    let haystack = format!("{} {}", message, kind).to_lowercase();
    if haystack.contains("api key")
        || haystack.contains("unauthorized")
        || haystack.contains("authentication")
    {
        CompletionError::Unauthorized
    } else if haystack.contains("rate limit") || haystack.contains("quota") {
        CompletionError::RateLimited
    } else if haystack.contains("content_policy")
        || haystack.contains("content policy")
        || haystack.contains("content_filter")
    {
        CompletionError::ContentFiltered
    } else if haystack.contains("timeout") || haystack.contains("timed out") {
        CompletionError::Timeout
    } else if haystack.contains("server error")
        || haystack.contains("internal error")
        || haystack.contains("overloaded")
    {
        CompletionError::ServerError(message.to_string())
    } else {
        CompletionError::Unknown(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::ApiError;

    fn api_error(message: &str, kind: Option<&str>) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: message.to_string(),
            r#type: kind.map(String::from),
            param: None,
            code: None,
        })
    }

    #[test]
    fn test_classify_unauthorized() {
        let err = api_error("Incorrect API key provided", None);
        assert!(matches!(classify(&err), CompletionError::Unauthorized));
    }

    #[test]
    fn test_classify_rate_limited() {
        let err = api_error("Rate limit reached for requests", None);
        assert!(matches!(classify(&err), CompletionError::RateLimited));

        let err = api_error("You exceeded your current quota", None);
        assert!(matches!(classify(&err), CompletionError::RateLimited));
    }

    #[test]
    fn test_classify_content_policy() {
        let err = api_error("rejected", Some("content_policy_violation"));
        assert!(matches!(classify(&err), CompletionError::ContentFiltered));
    }

    #[test]
    fn test_classify_server_error() {
        let err = api_error("The server is currently overloaded", None);
        assert!(matches!(classify(&err), CompletionError::ServerError(_)));
    }

    #[test]
    fn test_classify_unknown_keeps_detail() {
        let err = api_error("something novel happened", None);
        match classify(&err) {
            CompletionError::Unknown(detail) => {
                assert!(detail.contains("something novel"))
            }
            other => panic!("expected Unknown, got {:?}", other),
        }
    }

    #[test]
    fn test_every_kind_has_a_user_message() {
        let kinds = [
            CompletionError::Unauthorized,
            CompletionError::RateLimited,
            CompletionError::ServerError("x".into()),
            CompletionError::Timeout,
            CompletionError::ContentFiltered,
            CompletionError::Unknown("x".into()),
        ];
        for kind in kinds {
            assert!(!kind.user_message().is_empty());
        }
    }
}
