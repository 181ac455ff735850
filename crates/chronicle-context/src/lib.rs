//! Chronicle Context Management - conversation windowing and summarization
//!
//! This crate provides:
//! - Session, message and running-summary types
//! - Token estimation (precise tokenizer behind `token-counting`, heuristic fallback)
//! - Summarization through any language-model provider (`ai-summarizer`)
//! - The conversation context manager that assembles token-bounded contexts

pub mod config;
pub mod context;
pub mod error;
pub mod manager;
pub mod message;
pub mod metrics;
pub mod store;
pub mod summarizer;
pub mod token;

pub use config::{ContextConfiguration, ContextStrategy};
pub use context::{AssembledContext, BlockKind, ContextBlock, ContextStats};
pub use error::{ContextError, ContextResult};
pub use manager::{ConversationContextManager, SummaryOutcome};
pub use message::{Message, MessageRole, Session, SessionSummary};
pub use store::{InMemorySessionStore, SessionStore};
#[cfg(feature = "ai-summarizer")]
pub use summarizer::ProviderSummarizer;
pub use summarizer::{Summarizer, SummaryRequest};
pub use token::{select_estimator, HeuristicEstimator, TokenEstimator};

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::{ContextConfiguration, ContextStrategy};
    pub use crate::context::{AssembledContext, ContextBlock};
    pub use crate::error::{ContextError, ContextResult};
    pub use crate::manager::{ConversationContextManager, SummaryOutcome};
    pub use crate::message::{Message, MessageRole, Session};
    pub use crate::store::{InMemorySessionStore, SessionStore};
    pub use crate::summarizer::Summarizer;
    pub use crate::token::TokenEstimator;
}
