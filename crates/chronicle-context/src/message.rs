//! Conversation message and session types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TITLE_MAX_CHARS: usize = 50;

/// Message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Message in a session. Ids are assigned by the store and strictly increase
/// within a session; a message is never edited after it is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: u64,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(id: u64, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(id: u64, content: impl Into<String>) -> Self {
        Self::new(id, MessageRole::User, content)
    }

    pub fn assistant(id: u64, content: impl Into<String>) -> Self {
        Self::new(id, MessageRole::Assistant, content)
    }

    pub fn system(id: u64, content: impl Into<String>) -> Self {
        Self::new(id, MessageRole::System, content)
    }
}

/// Persisted running summary of a session.
///
/// The text and its boundary are always read and written together so a
/// reader can never pair a summary with the wrong `up_to_message_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub text: String,
    /// Id of the last message folded into `text`.
    pub up_to_message_id: u64,
    pub updated_at: DateTime<Utc>,
}

impl SessionSummary {
    pub fn new(text: impl Into<String>, up_to_message_id: u64) -> Self {
        Self {
            text: text.into(),
            up_to_message_id,
            updated_at: Utc::now(),
        }
    }
}

/// A single ongoing conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub title: Option<String>,
    /// Chronological; insertion order is id order.
    pub messages: Vec<Message>,
    pub summary: Option<SessionSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: None,
            messages: Vec::new(),
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_message(&mut self, message: Message) {
        if self.title.is_none() && message.role == MessageRole::User {
            self.title = Some(title_from(&message.content));
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_message_id(&self) -> Option<u64> {
        self.messages.last().map(|m| m.id)
    }

    /// Id of the last message covered by the summary, 0 when there is none.
    pub fn summary_boundary(&self) -> u64 {
        self.summary.as_ref().map_or(0, |s| s.up_to_message_id)
    }

    /// Messages strictly after the summary boundary.
    pub fn unsummarized_messages(&self) -> &[Message] {
        let boundary = self.summary_boundary();
        let start = self.messages.partition_point(|m| m.id <= boundary);
        &self.messages[start..]
    }

    /// Messages with `after < id <= up_to`, chronological.
    pub fn messages_between(&self, after: u64, up_to: u64) -> &[Message] {
        let start = self.messages.partition_point(|m| m.id <= after);
        let end = self.messages.partition_point(|m| m.id <= up_to);
        if start >= end {
            return &[];
        }
        &self.messages[start..end]
    }

    pub(crate) fn set_summary(&mut self, summary: SessionSummary) {
        self.summary = Some(summary);
        self.updated_at = Utc::now();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn title_from(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(count: u64) -> Session {
        let mut session = Session::new();
        for id in 1..=count {
            let msg = if id % 2 == 1 {
                Message::user(id, format!("question {id}"))
            } else {
                Message::assistant(id, format!("answer {id}"))
            };
            session.add_message(msg);
        }
        session
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        assert_eq!(MessageRole::User.to_string(), "user");
    }

    #[test]
    fn title_comes_from_first_user_message() {
        let mut session = Session::new();
        session.add_message(Message::system(1, "You are the campaign archivist."));
        assert!(session.title.is_none());

        session.add_message(Message::user(2, "Who is Captain Thorne?"));
        session.add_message(Message::user(3, "And the Crimson Company?"));

        assert_eq!(session.title.as_deref(), Some("Who is Captain Thorne?"));
    }

    #[test]
    fn long_title_is_cut_with_ellipsis() {
        let mut session = Session::new();
        session.add_message(Message::user(1, "x".repeat(80)));

        let title = session.title.unwrap();
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn unsummarized_messages_follow_boundary() {
        let mut session = session_with(10);
        assert_eq!(session.unsummarized_messages().len(), 10);

        session.set_summary(SessionSummary::new("earlier events", 4));

        let rest = session.unsummarized_messages();
        assert_eq!(rest.len(), 6);
        assert_eq!(rest[0].id, 5);
    }

    #[test]
    fn messages_between_is_half_open() {
        let session = session_with(10);

        let slice = session.messages_between(3, 6);
        let ids: Vec<u64> = slice.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![4, 5, 6]);

        assert!(session.messages_between(6, 6).is_empty());
        assert!(session.messages_between(8, 2).is_empty());
    }
}
