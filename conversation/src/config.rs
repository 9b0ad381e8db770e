//! Context engine configuration.

use chrono::Duration;

/// Tuning knobs for a context engine instance. One instance serves 1:1
/// conversations, another serves groups; both read the same shape.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Persona name a fresh context starts with.
    pub default_persona: String,
    /// Pair bound: a context keeps at most `2 * max_history` messages.
    pub max_history: usize,
    /// Token budget applied when assembling a prompt.
    pub max_context_tokens: usize,
    /// A context idle longer than this is recreated on next access.
    pub idle_timeout: Duration,
    /// Contexts idle longer than this are dropped by the retention sweep.
    pub retention: Duration,
    /// When false, prompt assembly skips stored history entirely.
    pub context_enabled: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_persona: "default".to_string(),
            max_history: 10,
            max_context_tokens: 3000,
            idle_timeout: Duration::hours(1),
            retention: Duration::days(7),
            context_enabled: true,
        }
    }
}
