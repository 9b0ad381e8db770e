//! Chat runtime configuration loaded from environment variables.
//!
//! Everything here has a default; `from_env` never fails. Load `.env` first
//! so overrides take effect.

use std::env;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use conversation::{ContextConfig, GroupConfig};
use persona::PersonaSet;
use ttl_cache::CacheTtlConfig;

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Tuning knobs for conversation, group, persona, cache, and maintenance.
#[derive(Debug, Clone)]
pub struct EnvChatConfig {
    pub default_persona: String,
    pub persona_set: PersonaSet,
    pub max_history: usize,
    pub max_context_tokens: usize,
    pub idle_timeout_secs: i64,
    pub retention_days: i64,
    pub context_enabled: bool,
    pub max_members: usize,
    pub shared_context_default: bool,
    pub cache_capacity: usize,
    pub cache_persona_ttl_secs: u64,
    pub cache_conversation_ttl_secs: u64,
    pub cache_api_ttl_secs: u64,
    /// SQLite URL for best-effort persistence; unset disables it.
    pub database_url: Option<String>,
    pub maintenance_interval_secs: u64,
}

impl EnvChatConfig {
    pub fn from_env() -> Self {
        let persona_set = match env::var("PERSONA_SET").as_deref() {
            Ok("complex") => PersonaSet::Complex,
            _ => PersonaSet::Simple,
        };
        Self {
            default_persona: env::var("DEFAULT_PERSONA")
                .unwrap_or_else(|_| "default".to_string()),
            persona_set,
            max_history: env_parse("MAX_HISTORY", 10),
            max_context_tokens: env_parse("MAX_CONTEXT_TOKENS", 3000),
            idle_timeout_secs: env_parse("CONTEXT_IDLE_TIMEOUT_SECS", 3600),
            retention_days: env_parse("CONTEXT_RETENTION_DAYS", 7),
            context_enabled: env_parse("CONTEXT_ENABLED", true),
            max_members: env_parse("GROUP_MAX_MEMBERS", 100),
            shared_context_default: env_parse("GROUP_SHARED_CONTEXT", true),
            cache_capacity: env_parse("CACHE_CAPACITY", 500),
            cache_persona_ttl_secs: env_parse("CACHE_PERSONA_TTL_SECS", 3600),
            cache_conversation_ttl_secs: env_parse("CACHE_CONVERSATION_TTL_SECS", 600),
            cache_api_ttl_secs: env_parse("CACHE_API_TTL_SECS", 300),
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            maintenance_interval_secs: env_parse("MAINTENANCE_INTERVAL_SECS", 3600),
        }
    }

    pub fn context_config(&self) -> ContextConfig {
        ContextConfig {
            default_persona: self.default_persona.clone(),
            max_history: self.max_history,
            max_context_tokens: self.max_context_tokens,
            idle_timeout: Duration::seconds(self.idle_timeout_secs),
            retention: Duration::days(self.retention_days),
            context_enabled: self.context_enabled,
        }
    }

    pub fn group_config(&self) -> GroupConfig {
        GroupConfig {
            max_members: self.max_members,
            shared_context_default: self.shared_context_default,
        }
    }

    pub fn cache_ttl_config(&self) -> CacheTtlConfig {
        CacheTtlConfig {
            persona_ttl: StdDuration::from_secs(self.cache_persona_ttl_secs),
            conversation_ttl: StdDuration::from_secs(self.cache_conversation_ttl_secs),
            api_ttl: StdDuration::from_secs(self.cache_api_ttl_secs),
        }
    }

    pub fn maintenance_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.maintenance_interval_secs)
    }
}
