use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "SymptomSync";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Language tag of the fenced block that carries an action.
pub const ACTION_MARKER: &str = "symptomsync-action";

/// Environment overrides read by `AssistantConfig::from_env`.
pub const ENV_MODELS: &str = "SYMPTOMSYNC_MODELS";
pub const ENV_AMBIGUITY: &str = "SYMPTOMSYNC_AMBIGUITY";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    "info,symptomsync_lib=debug".to_string()
}

// ═══════════════════════════════════════════════════════════
// Assistant
// ═══════════════════════════════════════════════════════════

/// What to do when a lookup still matches several records after narrowing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Refuse and list the candidates.
    #[default]
    Reject,
    /// Take the first match in listing order.
    FirstMatch,
}

impl AmbiguityPolicy {
    pub fn from_str_lossy(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Some(Self::Reject),
            "first_match" | "first-match" | "first" => Some(Self::FirstMatch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Models tried in rotation; the next one is used after a rate limit.
    pub models: Vec<String>,
    /// Case-insensitive substrings that mark an LLM error as rate limiting.
    pub rate_limit_markers: Vec<String>,
    pub ambiguity_policy: AmbiguityPolicy,
    /// Derive a health log from the user's message when the reply has no action.
    pub fallback_enabled: bool,
    /// Most recent messages sent as history (the new message is extra).
    pub history_window: usize,
    pub apply_failed_message: String,
    pub rate_limited_message: String,
    pub unavailable_message: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            models: vec![
                "gemini-2.0-flash".to_string(),
                "gemini-2.0-flash-lite".to_string(),
                "gemini-1.5-flash".to_string(),
            ],
            rate_limit_markers: ["429", "rate limit", "quota", "resource_exhausted"]
                .into_iter()
                .map(String::from)
                .collect(),
            ambiguity_policy: AmbiguityPolicy::Reject,
            fallback_enabled: true,
            history_window: 20,
            apply_failed_message: "Could not save the change. Please try again.".to_string(),
            rate_limited_message:
                "The assistant is busy right now. Please wait a moment and try again.".to_string(),
            unavailable_message:
                "The assistant is unavailable at the moment. Please try again later.".to_string(),
        }
    }
}

impl AssistantConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(
            std::env::var(ENV_MODELS).ok().as_deref(),
            std::env::var(ENV_AMBIGUITY).ok().as_deref(),
        )
    }

    fn with_overrides(mut self, models: Option<&str>, ambiguity: Option<&str>) -> Self {
        if let Some(raw) = models {
            let parsed: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
            if parsed.is_empty() {
                tracing::warn!(var = ENV_MODELS, "Empty model list, keeping defaults");
            } else {
                self.models = parsed;
            }
        }
        if let Some(raw) = ambiguity {
            match AmbiguityPolicy::from_str_lossy(raw) {
                Some(policy) => self.ambiguity_policy = policy,
                None => tracing::warn!(var = ENV_AMBIGUITY, value = raw, "Unknown ambiguity policy"),
            }
        }
        self
    }

    /// True if `message` looks like a rate-limit error.
    pub fn is_rate_limited(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.rate_limit_markers
            .iter()
            .any(|m| lower.contains(&m.to_lowercase()))
    }
}
