//! Assembled context returned to response generation

use serde::{Deserialize, Serialize};

use crate::config::ContextStrategy;
use crate::message::{Message, MessageRole};

pub(crate) const SUMMARY_PREFIX: &str = "Previous conversation summary: ";

/// What a block in the assembled context stands for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    SystemPrompt,
    Summary,
    Message { id: u64 },
    Current,
}

/// One entry of the assembled context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextBlock {
    pub kind: BlockKind,
    pub role: MessageRole,
    pub content: String,
}

impl ContextBlock {
    pub fn system_prompt(content: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::SystemPrompt,
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn summary(summary_text: &str) -> Self {
        Self {
            kind: BlockKind::Summary,
            role: MessageRole::System,
            content: format!("{SUMMARY_PREFIX}{summary_text}"),
        }
    }

    pub fn message(message: &Message) -> Self {
        Self {
            kind: BlockKind::Message { id: message.id },
            role: message.role,
            content: message.content.clone(),
        }
    }

    pub fn current(content: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Current,
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Token-bounded context built for a single request. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssembledContext {
    pub blocks: Vec<ContextBlock>,
    pub total_tokens: usize,
    pub max_tokens: usize,
}

impl AssembledContext {
    pub fn has_summary(&self) -> bool {
        self.blocks.iter().any(|b| b.kind == BlockKind::Summary)
    }

    /// Ids of the verbatim history messages, chronological.
    pub fn message_ids(&self) -> Vec<u64> {
        self.blocks
            .iter()
            .filter_map(|b| match b.kind {
                BlockKind::Message { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn within_limits(&self) -> bool {
        self.total_tokens <= self.max_tokens
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// `role: content` per block, one per line.
    pub fn render(&self) -> String {
        self.blocks
            .iter()
            .map(|b| format!("{}: {}", b.role, b.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Fixed-shape context statistics for monitoring
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextStats {
    /// Blocks in the assembled context
    pub total_messages: usize,
    pub total_tokens: usize,
    /// Summary blocks in the assembled context
    pub summary_count: usize,
    pub strategy_used: ContextStrategy,
    pub within_limits: bool,
    /// Messages stored for the session
    pub conversation_length: usize,
}

impl ContextStats {
    pub fn from_context(
        context: &AssembledContext,
        strategy: ContextStrategy,
        conversation_length: usize,
    ) -> Self {
        Self {
            total_messages: context.len(),
            total_tokens: context.total_tokens,
            summary_count: context
                .blocks
                .iter()
                .filter(|b| b.kind == BlockKind::Summary)
                .count(),
            strategy_used: strategy,
            within_limits: context.within_limits(),
            conversation_length,
        }
    }
}
