//! Conversation summarization

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ContextResult;
use crate::message::Message;

/// Hard cap on summary completion length, whatever the configured target.
pub const MAX_SUMMARY_COMPLETION_TOKENS: usize = 600;

const SUMMARY_SYSTEM_PROMPT: &str = "You are summarizing a D&D campaign conversation for context preservation. \
The participants are discussing campaign elements: remembering information, engaging creatively with existing content, \
bouncing ideas around, or having fun with the world and its characters. \
Do not continue the conversation and do not answer questions in it. Only output the summary.";

const RETENTION_RULES: &str = "Retention priorities, in order:
1. Named entities: characters, locations, items and factions. Copy every name exactly as written; never paraphrase or abbreviate a name.
2. Unresolved plot threads and open questions that may be referenced later.
3. Decisions the participants made and their consequences.
4. Theories, speculation and creative ideas that were discussed.

Generic prose compression is not enough. Keep concrete campaign details and use present tense.";

/// Input for a single summarizer call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRequest {
    /// Summary already persisted for the messages before `messages`.
    pub previous_summary: Option<String>,
    /// New messages to fold in, chronological.
    pub messages: Vec<Message>,
    pub target_tokens: usize,
}

/// System and user halves of a summarization prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryPrompt {
    pub system: String,
    pub user: String,
}

/// Produces a running summary from new messages and the previous summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn summarize(&self, request: SummaryRequest) -> ContextResult<String>;
}

pub fn build_summary_prompt(request: &SummaryRequest) -> SummaryPrompt {
    let transcript = request
        .messages
        .iter()
        .map(|m| format!("{}: {}", capitalize(m.role.as_str()), m.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut user = String::new();
    user.push_str(RETENTION_RULES);
    user.push_str(&format!(
        "\n\nKeep the summary under {} tokens.\n\n",
        request.target_tokens
    ));

    match request
        .previous_summary
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        Some(previous) => {
            user.push_str(
                "Write ONE combined summary of the existing summary AND the new messages. \
Preserve everything still relevant from the existing summary, add what the new messages contribute, \
and do not summarize the new messages on their own.\n\n",
            );
            user.push_str(&format!("Existing summary:\n{previous}\n\n"));
            user.push_str(&format!("New messages to merge:\n\n{transcript}"));
        }
        None => {
            user.push_str(&format!("Conversation to summarize:\n\n{transcript}"));
        }
    }

    SummaryPrompt {
        system: SUMMARY_SYSTEM_PROMPT.to_string(),
        user,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(feature = "ai-summarizer")]
pub use provider::ProviderSummarizer;

#[cfg(feature = "ai-summarizer")]
mod provider {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chronicle_runtime::{AIProvider, GenerateRequest};
    use tracing::debug;

    use super::{build_summary_prompt, Summarizer, SummaryRequest, MAX_SUMMARY_COMPLETION_TOKENS};
    use crate::error::{ContextError, ContextResult};

    const SUMMARY_TEMPERATURE: f32 = 0.3;

    /// Summarizer backed by any [`AIProvider`].
    pub struct ProviderSummarizer<P: ?Sized> {
        provider: Arc<P>,
        model: Option<String>,
    }

    impl<P: AIProvider + ?Sized> ProviderSummarizer<P> {
        pub fn new(provider: Arc<P>) -> Self {
            Self {
                provider,
                model: None,
            }
        }

        pub fn with_model(mut self, model: impl Into<String>) -> Self {
            self.model = Some(model.into());
            self
        }
    }

    #[async_trait]
    impl<P: AIProvider + ?Sized> Summarizer for ProviderSummarizer<P> {
        fn name(&self) -> &'static str {
            self.provider.name()
        }

        async fn summarize(&self, request: SummaryRequest) -> ContextResult<String> {
            let prompt = build_summary_prompt(&request);
            let max_tokens = request.target_tokens.clamp(1, MAX_SUMMARY_COMPLETION_TOKENS);

            let mut req = GenerateRequest::new(prompt.user)
                .with_system(prompt.system)
                .with_max_tokens(u32::try_from(max_tokens).unwrap_or(u32::MAX))
                .with_temperature(SUMMARY_TEMPERATURE);
            req.model = self.model.clone();

            debug!(
                provider = self.provider.name(),
                messages = request.messages.len(),
                max_tokens,
                "requesting conversation summary"
            );

            let response = self
                .provider
                .generate(req)
                .await
                .map_err(|e| ContextError::SummarizationFailed(e.to_string()))?;

            let text = response.content.trim();
            if text.is_empty() {
                return Err(ContextError::EmptySummary);
            }
            Ok(text.to_string())
        }
    }
}
