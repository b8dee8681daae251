use crate::report::Report;
use crate::session::{InterviewConfig, Session, SessionStatus, Turn};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session {0} already exists")]
    AlreadyExists(String),
    #[error("session {0} not found")]
    NotFound(String),
    #[error("session {0} has no turns to update")]
    EmptyHistory(String),
    #[error("session {0} already has a final report")]
    AlreadyCompleted(String),
    #[error("invalid session id {0:?}")]
    InvalidId(String),
    #[error("session {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

/// Durable, append-only record of interview turns keyed by session id.
///
/// The store only knows about documents: it has no notion of which request
/// may start, answer or finish a session. Sequencing belongs to the caller.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn create_session(
        &self,
        id: &str,
        role: &str,
        user_id: &str,
        config: &InterviewConfig,
    ) -> Result<(), StoreError>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Returns an empty history for unknown ids.
    async fn get_history(&self, id: &str) -> Result<Vec<Turn>, StoreError>;

    async fn append_turn(&self, id: &str, question: &str, answer: &str) -> Result<(), StoreError>;

    /// Sets the answer of the last turn asking `question`, or of the last turn
    /// if none matches.
    async fn update_last_turn_answer(
        &self,
        id: &str,
        question: &str,
        answer: &str,
    ) -> Result<(), StoreError>;

    /// Attaches the final report and marks the session completed. A second
    /// report for the same session is rejected.
    async fn save_report(&self, id: &str, report: &Report) -> Result<(), StoreError>;
}

pub(crate) fn fill_answer(session: &mut Session, question: &str, answer: &str) -> Result<(), StoreError> {
    let idx = session
        .history
        .iter()
        .rposition(|turn| turn.question == question)
        .or_else(|| session.history.len().checked_sub(1))
        .ok_or_else(|| StoreError::EmptyHistory(session.id.clone()))?;
    session.history[idx].answer = answer.to_string();
    Ok(())
}

pub(crate) fn attach_report(session: &mut Session, report: &Report) -> Result<(), StoreError> {
    if session.final_report.is_some() || session.status == SessionStatus::Completed {
        return Err(StoreError::AlreadyCompleted(session.id.clone()));
    }
    session.status = SessionStatus::Completed;
    session.final_report = Some(report.clone());
    session.completed_at = Some(Utc::now());
    Ok(())
}

/// A process-local store, used for tests and when no store directory is
/// configured.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn create_session(
        &self,
        id: &str,
        role: &str,
        user_id: &str,
        config: &InterviewConfig,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(id) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        sessions.insert(id.to_string(), Session::new(id, role, user_id, config));
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn get_history(&self, id: &str) -> Result<Vec<Turn>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(id)
            .map(|session| session.history.clone())
            .unwrap_or_default())
    }

    async fn append_turn(&self, id: &str, question: &str, answer: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        session.history.push(Turn::new(question, answer));
        Ok(())
    }

    async fn update_last_turn_answer(
        &self,
        id: &str,
        question: &str,
        answer: &str,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        fill_answer(session, question, answer)
    }

    async fn save_report(&self, id: &str, report: &Report) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        attach_report(session, report)
    }
}
