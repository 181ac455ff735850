//! Token estimation
//!
//! The precise estimator wraps a `tokenizers` definition and is only built
//! with the `token-counting` feature. The heuristic estimator is always
//! available and is what every failure path falls back to.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ContextConfiguration;
use crate::message::Message;

/// Average characters per token for English text with GPT-family tokenizers.
const CHARS_PER_TOKEN: usize = 4;
const TRUNCATION_MARKER: &str = "...";

/// Estimates how many model tokens text occupies.
///
/// Implementations must be deterministic and must never fail.
pub trait TokenEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    fn count_text(&self, text: &str) -> usize;

    /// Cut `text` down to roughly `max_tokens` tokens.
    fn truncate_to_tokens(&self, text: &str, max_tokens: usize) -> String;

    fn estimate_token_count(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count_text(&m.content)).sum()
    }
}

/// Character-count heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn count_text(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        (text.chars().count() / CHARS_PER_TOKEN).max(1)
    }

    fn truncate_to_tokens(&self, text: &str, max_tokens: usize) -> String {
        if max_tokens == 0 {
            return String::new();
        }
        if self.count_text(text) <= max_tokens {
            return text.to_string();
        }
        // The marker is budgeted inside the limit so the result never counts higher.
        let keep = max_tokens
            .saturating_mul(CHARS_PER_TOKEN)
            .saturating_sub(TRUNCATION_MARKER.len());
        let mut cut: String = text.chars().take(keep).collect();
        cut.push_str(TRUNCATION_MARKER);
        cut
    }
}

#[cfg(feature = "token-counting")]
pub use precise::TokenizerEstimator;

#[cfg(feature = "token-counting")]
mod precise {
    use std::path::Path;

    use tokenizers::Tokenizer;
    use tracing::debug;

    use super::{HeuristicEstimator, TokenEstimator};
    use crate::error::{ContextError, ContextResult};

    /// Exact counts from a `tokenizer.json` definition.
    pub struct TokenizerEstimator {
        tokenizer: Tokenizer,
        fallback: HeuristicEstimator,
    }

    impl TokenizerEstimator {
        pub fn from_file(path: impl AsRef<Path>) -> ContextResult<Self> {
            let tokenizer = Tokenizer::from_file(path.as_ref())
                .map_err(|e| ContextError::TokenCountError(e.to_string()))?;
            Ok(Self {
                tokenizer,
                fallback: HeuristicEstimator,
            })
        }

        fn encode_ids(&self, text: &str) -> Option<Vec<u32>> {
            match self.tokenizer.encode(text, false) {
                Ok(encoding) => Some(encoding.get_ids().to_vec()),
                Err(e) => {
                    debug!(error = %e, "tokenizer encode failed, using heuristic");
                    None
                }
            }
        }
    }

    impl TokenEstimator for TokenizerEstimator {
        fn name(&self) -> &'static str {
            "tokenizer"
        }

        fn count_text(&self, text: &str) -> usize {
            if text.is_empty() {
                return 0;
            }
            self.encode_ids(text)
                .map_or_else(|| self.fallback.count_text(text), |ids| ids.len())
        }

        fn truncate_to_tokens(&self, text: &str, max_tokens: usize) -> String {
            let Some(ids) = self.encode_ids(text) else {
                return self.fallback.truncate_to_tokens(text, max_tokens);
            };
            if ids.len() <= max_tokens {
                return text.to_string();
            }
            match self.tokenizer.decode(&ids[..max_tokens], true) {
                Ok(decoded) => decoded,
                Err(e) => {
                    debug!(error = %e, "tokenizer decode failed, using heuristic");
                    self.fallback.truncate_to_tokens(text, max_tokens)
                }
            }
        }
    }
}

/// Pick the estimator once at startup.
///
/// A configured tokenizer that cannot be loaded is logged and replaced by
/// the heuristic; this never fails.
pub fn select_estimator(config: &ContextConfiguration) -> Arc<dyn TokenEstimator> {
    let Some(path) = config.tokenizer_path.as_ref() else {
        return Arc::new(HeuristicEstimator);
    };

    #[cfg(feature = "token-counting")]
    {
        match TokenizerEstimator::from_file(path) {
            Ok(estimator) => {
                info!(path = %path.display(), "using tokenizer token estimator");
                return Arc::new(estimator);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load tokenizer, using heuristic");
            }
        }
    }

    #[cfg(not(feature = "token-counting"))]
    warn!(
        path = %path.display(),
        "tokenizer configured but token-counting feature is disabled, using heuristic"
    );

    info!("using heuristic token estimator");
    Arc::new(HeuristicEstimator)
}
