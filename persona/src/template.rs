//! The persona template record.

use serde::{Deserialize, Serialize};

/// A persona template: system prompt plus sampling parameters and the
/// user-facing trimmings. Immutable once registered; the `name` is the unique
/// key across built-in and custom personas combined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaTemplate {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    /// Sampling temperature, 0–2.
    pub temperature: f32,
    /// Completion token cap, > 0.
    pub max_tokens: u32,
    /// Reply sent when the user switches to this persona.
    pub greeting: String,
    /// Ordered personality traits, used in help text.
    pub traits: Vec<String>,
    pub avatar: Option<String>,
}

impl PersonaTemplate {
    /// Builds a template with no avatar; built-in tables and custom persona
    /// commands both go through here.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
        greeting: impl Into<String>,
        traits: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            temperature,
            max_tokens,
            greeting: greeting.into(),
            traits,
            avatar: None,
        }
    }

    /// Safety net template used when even the configured default persona is
    /// missing from the catalog. Callers must always get a persona back.
    pub fn fallback() -> Self {
        Self::new(
            "default",
            "通用助手",
            "You are a helpful assistant.",
            0.7,
            1024,
            "你好，我是智能助手，有什么可以帮你？",
            vec!["friendly".to_string(), "helpful".to_string()],
        )
    }
}
