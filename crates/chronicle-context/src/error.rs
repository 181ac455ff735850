//! Error types for context management

use thiserror::Error;
use uuid::Uuid;

/// Context management error type
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Token counting error: {0}")]
    TokenCountError(String),

    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("Summarizer timed out after {timeout_ms}ms")]
    SummarizerTimeout { timeout_ms: u64 },

    #[error("Summarizer returned an empty summary")]
    EmptySummary,

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ContextError {
    /// Whether the caller can degrade to a smaller context instead of failing.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::SessionNotFound(_) | Self::InvalidMessage(_))
    }
}

/// Result type for context operations
pub type ContextResult<T> = Result<T, ContextError>;
