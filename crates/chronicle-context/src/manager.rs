//! Conversation context manager
//!
//! Decides how much history goes into a request verbatim, when older history
//! is folded into the session's running summary, and trims the result to the
//! token budget. Every degradation path ends in a smaller but valid context;
//! only an unknown session is reported as an error.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ContextConfiguration, ContextStrategy};
use crate::context::{AssembledContext, ContextBlock, ContextStats, SUMMARY_PREFIX};
use crate::error::{ContextError, ContextResult};
use crate::message::{Message, MessageRole, Session, SessionSummary};
use crate::metrics;
use crate::store::SessionStore;
use crate::summarizer::{Summarizer, SummaryRequest};
use crate::token::{select_estimator, TokenEstimator};

/// Under `hybrid`, token-triggered summaries need at least this many older
/// messages (two user/assistant exchanges).
pub const MIN_OLDER_MESSAGES_FOR_SUMMARY: usize = 4;

/// Result of a [`ConversationContextManager::create_summary`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOutcome {
    /// A new summary was generated and persisted.
    Updated(SessionSummary),
    /// Nothing new to fold in; carries the persisted summary, if any.
    Unchanged(Option<SessionSummary>),
    /// Generated but not persisted. Usable for the current request only.
    Ephemeral(SessionSummary),
    /// The summarizer failed; the persisted summary is untouched.
    Failed {
        reason: String,
        previous: Option<SessionSummary>,
    },
}

impl SummaryOutcome {
    /// Summary the current request should use.
    pub fn summary(&self) -> Option<&SessionSummary> {
        match self {
            Self::Updated(summary) | Self::Ephemeral(summary) => Some(summary),
            Self::Unchanged(previous) | Self::Failed { previous, .. } => previous.as_ref(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Updated(_) => "updated",
            Self::Unchanged(_) => "unchanged",
            Self::Ephemeral(_) => "ephemeral",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Builds bounded conversation contexts for chat sessions
pub struct ConversationContextManager {
    store: Arc<dyn SessionStore>,
    estimator: Arc<dyn TokenEstimator>,
    summarizer: Option<Arc<dyn Summarizer>>,
    config: ContextConfiguration,
    summary_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ConversationContextManager {
    /// Create a manager with the estimator selected from `config` and no summarizer.
    pub fn new(store: Arc<dyn SessionStore>, config: ContextConfiguration) -> Self {
        let estimator = select_estimator(&config);
        Self {
            store,
            estimator,
            summarizer: None,
            config,
            summary_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn config(&self) -> &ContextConfiguration {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Create a new session
    pub async fn create_session(&self) -> ContextResult<Uuid> {
        self.store.create_session().await
    }

    /// Append a message to a session. Blank content is rejected.
    pub async fn add_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: impl Into<String>,
    ) -> ContextResult<Message> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ContextError::InvalidMessage(format!(
                "empty {role} message for session {session_id}"
            )));
        }
        self.store.append_message(session_id, role, content).await
    }

    pub fn estimate_token_count(&self, messages: &[Message]) -> usize {
        self.estimator.estimate_token_count(messages)
    }

    /// Whether the session has enough unsummarized history outside the
    /// configured verbatim window to warrant a summary. Side-effect free.
    pub fn should_summarize(&self, session: &Session) -> bool {
        self.summarization_due(session, self.config.max_recent_messages)
    }

    fn summarization_due(&self, session: &Session, max_recent: usize) -> bool {
        let older = older_unsummarized(session, max_recent);
        if older.is_empty() {
            return false;
        }

        if session.unsummarized_messages().len() > self.config.summarization_message_threshold {
            return true;
        }

        let over_tokens =
            || self.estimate_token_count(older) > self.config.summarization_threshold;
        match self.config.strategy {
            ContextStrategy::Truncate => false,
            ContextStrategy::Summarize => over_tokens(),
            ContextStrategy::Hybrid => {
                older.len() >= MIN_OLDER_MESSAGES_FOR_SUMMARY && over_tokens()
            }
        }
    }

    /// Fold messages after the current boundary, up to `up_to_message_id`
    /// (default: latest), into the session summary.
    ///
    /// Summarizer failures are reported through [`SummaryOutcome::Failed`];
    /// the only error is an unknown session.
    pub async fn create_summary(
        &self,
        session_id: Uuid,
        up_to_message_id: Option<u64>,
    ) -> ContextResult<SummaryOutcome> {
        let lock = self.summary_lock(session_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.summarize_locked(session_id, up_to_message_id).await
        };
        self.release_summary_lock(session_id, &lock).await;
        outcome
    }

    async fn summarize_locked(
        &self,
        session_id: Uuid,
        up_to_message_id: Option<u64>,
    ) -> ContextResult<SummaryOutcome> {
        // Re-read under the lock so a waiter sees a summary written by the holder.
        let session = self.store.get_session(session_id).await?;
        let Some(last_id) = session.last_message_id() else {
            return Ok(SummaryOutcome::Unchanged(session.summary));
        };

        let target = up_to_message_id.map_or(last_id, |id| id.min(last_id));
        let boundary = session.summary_boundary();
        let pending = session.messages_between(boundary, target);
        if pending.is_empty() {
            debug!(%session_id, boundary, target, "summary already covers requested range");
            return Ok(SummaryOutcome::Unchanged(session.summary));
        }

        let outcome = match self.generate_summary(&session, pending).await {
            Ok(text) => {
                let summary = SessionSummary::new(text, target);
                match self.store.save_summary(session_id, summary.clone()).await {
                    Ok(()) => {
                        info!(
                            %session_id,
                            messages = pending.len(),
                            up_to = target,
                            tokens = self.estimator.count_text(&summary.text),
                            "updated conversation summary"
                        );
                        SummaryOutcome::Updated(summary)
                    }
                    Err(e) => {
                        warn!(%session_id, error = %e, "failed to persist summary, using it for this request only");
                        SummaryOutcome::Ephemeral(summary)
                    }
                }
            }
            Err(e) => {
                warn!(%session_id, error = %e, "summarization failed, falling back to truncation");
                SummaryOutcome::Failed {
                    reason: e.to_string(),
                    previous: session.summary.clone(),
                }
            }
        };

        metrics::record_summary(outcome.label());
        Ok(outcome)
    }

    async fn generate_summary(&self, session: &Session, pending: &[Message]) -> ContextResult<String> {
        let summarizer = self
            .summarizer
            .as_ref()
            .ok_or_else(|| ContextError::SummarizationFailed("no summarizer configured".to_string()))?;

        let request = SummaryRequest {
            previous_summary: session.summary.as_ref().map(|s| s.text.clone()),
            messages: pending.to_vec(),
            target_tokens: self.config.summary_target_tokens,
        };

        let timeout = self.config.summary_timeout();
        let text = tokio::time::timeout(timeout, summarizer.summarize(request))
            .await
            .map_err(|_| ContextError::SummarizerTimeout {
                timeout_ms: self.config.summary_timeout_ms,
            })??;

        let text = text.trim();
        if text.is_empty() {
            return Err(ContextError::EmptySummary);
        }
        Ok(self.enforce_summary_length(text))
    }

    /// Summaries more than 1.5x over target are cut back to the target.
    fn enforce_summary_length(&self, text: &str) -> String {
        let target = self.config.summary_target_tokens;
        let tokens = self.estimator.count_text(text);
        if target == 0 || tokens.saturating_mul(2) <= target.saturating_mul(3) {
            return text.to_string();
        }
        debug!(tokens, target, "summary over target, truncating");
        self.estimator.truncate_to_tokens(text, target)
    }

    /// Context for `current_message` using the configured window and budget.
    pub async fn build_context(
        &self,
        session_id: Uuid,
        current_message: &str,
    ) -> ContextResult<AssembledContext> {
        self.get_conversation_context(
            session_id,
            current_message,
            self.config.max_recent_messages,
            self.config.max_conversation_tokens,
        )
        .await
    }

    /// Assemble `[system prompt] + [summary] + recent messages + current message`
    /// within `max_tokens`.
    ///
    /// The result can exceed `max_tokens` only when the system prompt and the
    /// current message alone do.
    pub async fn get_conversation_context(
        &self,
        session_id: Uuid,
        current_message: &str,
        max_recent_messages: usize,
        max_tokens: usize,
    ) -> ContextResult<AssembledContext> {
        let mut session = self.store.get_session(session_id).await?;

        let prefix: Vec<ContextBlock> = self
            .config
            .system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(ContextBlock::system_prompt)
            .into_iter()
            .collect();
        let current = ContextBlock::current(current_message);

        if session.is_empty() || max_recent_messages == 0 || max_tokens == 0 {
            return Ok(self.finish(session_id, prefix, None, Vec::new(), current, max_tokens, 0));
        }

        if self.config.strategy.summarizes() && self.summarization_due(&session, max_recent_messages) {
            let window_start = session.len() - max_recent_messages.min(session.len());
            let up_to = session.messages[window_start - 1].id;
            match self.create_summary(session_id, Some(up_to)).await {
                Ok(outcome) => {
                    if let Some(summary) = outcome.summary() {
                        session.summary = Some(summary.clone());
                    }
                }
                Err(e) if e.is_recoverable() => {
                    warn!(%session_id, error = %e, "skipping summary for this request");
                }
                Err(e) => return Err(e),
            }
        }

        let window_start = session.len() - max_recent_messages.min(session.len());
        let summary = session
            .summary
            .as_ref()
            .filter(|s| window_start > 0 && !s.text.trim().is_empty());
        let boundary = summary.map_or(0, |s| s.up_to_message_id);
        let gap = summary.map_or(0, |_| left_out_count(&session, boundary, window_start));
        if gap > 0 {
            debug!(%session_id, gap, boundary, "messages between summary and recent window left out");
        }

        let mut recent: VecDeque<(ContextBlock, usize)> = session.messages[window_start..]
            .iter()
            .filter(|m| m.id > boundary)
            .map(|m| (ContextBlock::message(m), self.estimator.count_text(&m.content)))
            .collect();

        let fixed = self.block_tokens(&prefix) + self.estimator.count_text(&current.content);
        let mut summary_block = summary.map(|s| ContextBlock::summary(&s.text));
        let mut summary_tokens = summary_block
            .as_ref()
            .map_or(0, |b| self.estimator.count_text(&b.content));
        let mut recent_tokens: usize = recent.iter().map(|(_, t)| t).sum();

        let mut trimmed = 0;
        while fixed + summary_tokens + recent_tokens > max_tokens {
            let Some((_, tokens)) = recent.pop_front() else {
                break;
            };
            recent_tokens -= tokens;
            trimmed += 1;
        }

        if fixed + summary_tokens + recent_tokens > max_tokens {
            if let Some(s) = summary {
                summary_block = self.shrink_summary(&s.text, max_tokens.saturating_sub(fixed));
                summary_tokens = summary_block
                    .as_ref()
                    .map_or(0, |b| self.estimator.count_text(&b.content));
            }
        }

        if trimmed > 0 {
            debug!(%session_id, trimmed, max_tokens, "trimmed recent window to fit budget");
        }

        let recent = recent.into_iter().map(|(block, _)| block).collect();
        Ok(self.finish(session_id, prefix, summary_block, recent, current, max_tokens, trimmed))
    }

    /// Last resort: cut the summary to the target length and the space left.
    fn shrink_summary(&self, text: &str, available: usize) -> Option<ContextBlock> {
        let room = available.saturating_sub(self.estimator.count_text(SUMMARY_PREFIX));
        let limit = room.min(self.config.summary_target_tokens);
        if limit == 0 {
            return None;
        }

        let block = ContextBlock::summary(&self.estimator.truncate_to_tokens(text, limit));
        (self.estimator.count_text(&block.content) <= available).then_some(block)
    }

    fn block_tokens(&self, blocks: &[ContextBlock]) -> usize {
        blocks
            .iter()
            .map(|b| self.estimator.count_text(&b.content))
            .sum()
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        session_id: Uuid,
        prefix: Vec<ContextBlock>,
        summary: Option<ContextBlock>,
        recent: Vec<ContextBlock>,
        current: ContextBlock,
        max_tokens: usize,
        trimmed: usize,
    ) -> AssembledContext {
        let mut blocks = prefix;
        blocks.extend(summary);
        blocks.extend(recent);
        blocks.push(current);

        let total_tokens = self.block_tokens(&blocks);
        if total_tokens > max_tokens {
            warn!(
                %session_id,
                total_tokens,
                max_tokens,
                "system prompt and current message alone exceed the token budget"
            );
        }
        metrics::record_context(total_tokens, trimmed);

        AssembledContext {
            blocks,
            total_tokens,
            max_tokens,
        }
    }

    /// Assemble the context for `current_message` and describe it.
    pub async fn get_context_stats(
        &self,
        session_id: Uuid,
        current_message: &str,
    ) -> ContextResult<ContextStats> {
        let context = self.build_context(session_id, current_message).await?;
        let conversation_length = self.store.get_session(session_id).await?.len();
        Ok(ContextStats::from_context(
            &context,
            self.config.strategy,
            conversation_length,
        ))
    }

    async fn summary_lock(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        self.summary_locks
            .lock()
            .await
            .entry(session_id)
            .or_default()
            .clone()
    }

    /// Drop the map entry once the map and `lock` are its only holders.
    async fn release_summary_lock(&self, session_id: Uuid, lock: &Arc<Mutex<()>>) {
        let mut locks = self.summary_locks.lock().await;
        if Arc::strong_count(lock) == 2 {
            locks.remove(&session_id);
        }
    }

    #[cfg(test)]
    async fn summary_lock_count(&self) -> usize {
        self.summary_locks.lock().await.len()
    }
}

/// Unsummarized messages that fall outside the verbatim window.
fn older_unsummarized(session: &Session, max_recent: usize) -> &[Message] {
    let window_start = session.len() - max_recent.min(session.len());
    let older = &session.messages[..window_start];
    let boundary = session.summary_boundary();
    let start = older.partition_point(|m| m.id <= boundary);
    &older[start..]
}

/// Messages after the summary boundary that precede the verbatim window.
fn left_out_count(session: &Session, boundary: u64, window_start: usize) -> usize {
    let older = &session.messages[..window_start];
    older.len() - older.partition_point(|m| m.id <= boundary)
}
