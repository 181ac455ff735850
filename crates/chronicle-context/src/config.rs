//! Context window configuration

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

const ENV_PREFIX: &str = "CHRONICLE_CONTEXT_";

/// Strategy for keeping a conversation inside its token budget
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextStrategy {
    /// Drop the oldest history
    Truncate,
    /// Fold older history into a running summary
    Summarize,
    /// Summarize only when the dropped history is worth a model call
    #[default]
    Hybrid,
}

impl ContextStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextStrategy::Truncate => "truncate",
            ContextStrategy::Summarize => "summarize",
            ContextStrategy::Hybrid => "hybrid",
        }
    }

    pub fn summarizes(&self) -> bool {
        !matches!(self, ContextStrategy::Truncate)
    }
}

impl std::fmt::Display for ContextStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContextStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "truncate" => Ok(ContextStrategy::Truncate),
            "summarize" => Ok(ContextStrategy::Summarize),
            "hybrid" => Ok(ContextStrategy::Hybrid),
            other => Err(format!("unknown context strategy: {other}")),
        }
    }
}

/// Conversation context configuration. Immutable once handed to a manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextConfiguration {
    /// Token budget for the whole assembled context
    pub max_conversation_tokens: usize,
    /// Most recent messages kept verbatim
    pub max_recent_messages: usize,
    /// Unsummarized message count above which a summary is due
    pub summarization_message_threshold: usize,
    /// Token count of older unsummarized messages above which a summary is due
    pub summarization_threshold: usize,
    /// Target length of generated summaries
    pub summary_target_tokens: usize,
    pub strategy: ContextStrategy,
    /// Upper bound on a single summarizer call
    pub summary_timeout_ms: u64,
    /// Optional system prompt placed ahead of everything else
    pub system_prompt: Option<String>,
    /// Tokenizer definition for the precise estimator
    pub tokenizer_path: Option<PathBuf>,
}

impl Default for ContextConfiguration {
    fn default() -> Self {
        Self {
            max_conversation_tokens: 2000,
            max_recent_messages: 6,
            summarization_message_threshold: 20,
            summarization_threshold: 1500,
            summary_target_tokens: 400,
            strategy: ContextStrategy::Hybrid,
            summary_timeout_ms: 30_000,
            system_prompt: None,
            tokenizer_path: None,
        }
    }
}

impl ContextConfiguration {
    pub fn new(strategy: ContextStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    /// Build a configuration from `CHRONICLE_CONTEXT_*` variables.
    ///
    /// Never fails: unset or unparsable values keep their defaults and
    /// negative numbers clamp to zero.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let strategy = match read("STRATEGY") {
            Some(raw) => raw.parse().unwrap_or_else(|e: String| {
                warn!(error = %e, "ignoring context strategy override");
                defaults.strategy
            }),
            None => defaults.strategy,
        };

        Self {
            max_conversation_tokens: clamped(read("MAX_TOKENS"), defaults.max_conversation_tokens),
            max_recent_messages: clamped(read("MAX_RECENT_MESSAGES"), defaults.max_recent_messages),
            summarization_message_threshold: clamped(
                read("SUMMARY_MESSAGE_THRESHOLD"),
                defaults.summarization_message_threshold,
            ),
            summarization_threshold: clamped(
                read("SUMMARY_TOKEN_THRESHOLD"),
                defaults.summarization_threshold,
            ),
            summary_target_tokens: clamped(
                read("SUMMARY_TARGET_TOKENS"),
                defaults.summary_target_tokens,
            ),
            strategy,
            summary_timeout_ms: clamped(read("SUMMARY_TIMEOUT_MS"), defaults.summary_timeout_ms as usize)
                as u64,
            system_prompt: read("SYSTEM_PROMPT").filter(|s| !s.trim().is_empty()),
            tokenizer_path: read("TOKENIZER_PATH")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn with_max_conversation_tokens(mut self, tokens: i64) -> Self {
        self.max_conversation_tokens = clamp_non_negative(tokens);
        self
    }

    pub fn with_max_recent_messages(mut self, messages: i64) -> Self {
        self.max_recent_messages = clamp_non_negative(messages);
        self
    }

    pub fn with_summarization_message_threshold(mut self, messages: i64) -> Self {
        self.summarization_message_threshold = clamp_non_negative(messages);
        self
    }

    pub fn with_summarization_threshold(mut self, tokens: i64) -> Self {
        self.summarization_threshold = clamp_non_negative(tokens);
        self
    }

    pub fn with_summary_target_tokens(mut self, tokens: i64) -> Self {
        self.summary_target_tokens = clamp_non_negative(tokens);
        self
    }

    pub fn with_strategy(mut self, strategy: ContextStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_summary_timeout(mut self, timeout: Duration) -> Self {
        self.summary_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tokenizer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tokenizer_path = Some(path.into());
        self
    }

    pub fn summary_timeout(&self) -> Duration {
        Duration::from_millis(self.summary_timeout_ms)
    }
}

/// Negative values mean "nothing", never an error.
pub fn clamp_non_negative(value: i64) -> usize {
    usize::try_from(value.max(0)).unwrap_or(usize::MAX)
}

fn clamped(raw: Option<String>, default: usize) -> usize {
    match raw.map(|v| v.trim().parse::<i64>()) {
        Some(Ok(value)) => clamp_non_negative(value),
        Some(Err(e)) => {
            warn!(error = %e, default, "ignoring unparsable context setting");
            default
        }
        None => default,
    }
}
