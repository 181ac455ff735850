//! Session store trait and in-memory implementation

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ContextError, ContextResult};
use crate::message::{Message, MessageRole, Session, SessionSummary};

/// Message and summary persistence for sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create an empty session
    async fn create_session(&self) -> ContextResult<Uuid>;

    /// Snapshot of a session, messages in chronological order
    async fn get_session(&self, session_id: Uuid) -> ContextResult<Session>;

    /// Messages of a session in chronological order
    async fn list_messages(&self, session_id: Uuid) -> ContextResult<Vec<Message>> {
        Ok(self.get_session(session_id).await?.messages)
    }

    /// Append a message; the store assigns the next id
    async fn append_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: String,
    ) -> ContextResult<Message>;

    /// Read the persisted summary
    async fn load_summary(&self, session_id: Uuid) -> ContextResult<Option<SessionSummary>> {
        Ok(self.get_session(session_id).await?.summary)
    }

    /// Replace the persisted summary as one unit. Last writer wins.
    async fn save_summary(&self, session_id: Uuid, summary: SessionSummary) -> ContextResult<()>;
}

/// In-memory session store
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self) -> ContextResult<Uuid> {
        let session = Session::new();
        let id = session.id;
        self.sessions.write().await.insert(id, session);
        Ok(id)
    }

    async fn get_session(&self, session_id: Uuid) -> ContextResult<Session> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(ContextError::SessionNotFound(session_id))
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: String,
    ) -> ContextResult<Message> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(ContextError::SessionNotFound(session_id))?;

        let id = session.last_message_id().unwrap_or(0) + 1;
        let message = Message::new(id, role, content);
        session.add_message(message.clone());
        Ok(message)
    }

    async fn save_summary(&self, session_id: Uuid, summary: SessionSummary) -> ContextResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(ContextError::SessionNotFound(session_id))?;
        session.set_summary(summary);
        Ok(())
    }
}
