use crate::error::InterviewError;
use crate::report::Report;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owner recorded for sessions started without a user id.
pub const ANONYMOUS_USER: &str = "guest";

/// Token the question oracle emits once it considers the interview finished.
pub const STOP_TOKEN: &str = "stop";

const MAX_SESSION_ID_LEN: usize = 128;

/// One question/answer exchange. An empty `answer` means the question is
/// still waiting for the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(alias = "Q")]
    pub question: String,
    #[serde(alias = "A")]
    pub answer: String,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }

    pub fn is_answered(&self) -> bool {
        !self.answer.is_empty()
    }
}

/// Per-session interview settings passed through to the oracles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewConfig {
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub job_description: Option<String>,
}

impl InterviewConfig {
    /// Fills the fields this config leaves unset from `stored`.
    pub fn or(self, stored: &InterviewConfig) -> InterviewConfig {
        InterviewConfig {
            difficulty: self.difficulty.or_else(|| stored.difficulty.clone()),
            job_description: self
                .job_description
                .or_else(|| stored.job_description.clone()),
        }
    }

    pub fn difficulty_or_default(&self) -> &str {
        self.difficulty.as_deref().unwrap_or("medium")
    }

    pub fn job_description_or_default(&self) -> &str {
        self.job_description.as_deref().unwrap_or("(none provided)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

/// The persisted record of one interview attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub role: String,
    #[serde(default)]
    pub config: InterviewConfig,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<Turn>,
    #[serde(default)]
    pub final_report: Option<Report>,
}

impl Session {
    pub fn new(id: &str, role: &str, user_id: &str, config: &InterviewConfig) -> Self {
        Self {
            id: id.to_string(),
            user_id: user_id.to_string(),
            role: role.to_string(),
            config: config.clone(),
            status: SessionStatus::Active,
            created_at: Utc::now(),
            completed_at: None,
            history: Vec::new(),
            final_report: None,
        }
    }
}

/// Returns true when a generated question signals the end of the interview.
pub fn signals_stop(question: &str) -> bool {
    question.to_lowercase().contains(STOP_TOKEN)
}

/// Session ids double as document keys, so they are restricted to a
/// filename-safe alphabet.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn ensure_valid_session_id(id: &str) -> Result<(), InterviewError> {
    if is_valid_session_id(id) {
        Ok(())
    } else {
        Err(InterviewError::bad_request(format!(
            "invalid session id {id:?}: expected 1-{MAX_SESSION_ID_LEN} characters of [A-Za-z0-9_-]"
        )))
    }
}

/// Where a session stands, derived from what the store holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// No turns yet. `record_exists` is set when a session record survived
    /// from a start that never got its first question appended.
    NotStarted { record_exists: bool },
    /// The last turn's question has not been answered.
    AwaitingAnswer { question: String },
    /// The last turn is answered but no follow-up question was appended.
    AnswerRecorded { answer: String },
    /// The last question carries the stop token.
    Concluded { question: String },
    /// A final report has been saved.
    Completed,
}

/// The action the controller takes for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Start { create_record: bool },
    Resume { question: String },
    Answer { question: String, answer: String },
    Regenerate,
}

impl SessionPhase {
    pub fn of(session: Option<&Session>) -> Self {
        let Some(session) = session else {
            return SessionPhase::NotStarted {
                record_exists: false,
            };
        };
        if session.status == SessionStatus::Completed {
            return SessionPhase::Completed;
        }
        match session.history.last() {
            None => SessionPhase::NotStarted {
                record_exists: true,
            },
            Some(turn) if signals_stop(&turn.question) => SessionPhase::Concluded {
                question: turn.question.clone(),
            },
            Some(turn) if !turn.is_answered() => SessionPhase::AwaitingAnswer {
                question: turn.question.clone(),
            },
            Some(turn) => SessionPhase::AnswerRecorded {
                answer: turn.answer.clone(),
            },
        }
    }

    /// Applies the transition table to a request carrying `answer`.
    ///
    /// `answer` must already be trimmed, with blank answers passed as `None`.
    pub fn transition(self, answer: Option<&str>) -> Result<Transition, InterviewError> {
        match (self, answer) {
            (SessionPhase::NotStarted { record_exists }, None) => Ok(Transition::Start {
                create_record: !record_exists,
            }),
            (SessionPhase::NotStarted { .. }, Some(_)) => Err(InterviewError::bad_request(
                "cannot answer a session that was never started",
            )),
            (SessionPhase::AwaitingAnswer { question }, None) => {
                Ok(Transition::Resume { question })
            }
            (SessionPhase::AwaitingAnswer { question }, Some(answer)) => Ok(Transition::Answer {
                question,
                answer: answer.to_string(),
            }),
            (SessionPhase::AnswerRecorded { .. }, None) => Ok(Transition::Regenerate),
            (SessionPhase::AnswerRecorded { answer: recorded }, Some(answer)) => {
                if recorded == answer {
                    // Retry of an answer whose follow-up question was lost.
                    Ok(Transition::Regenerate)
                } else {
                    Err(InterviewError::bad_request(
                        "no question is awaiting an answer in this session",
                    ))
                }
            }
            (SessionPhase::Concluded { question }, None) => Ok(Transition::Resume { question }),
            (SessionPhase::Concluded { .. }, Some(_)) => Err(InterviewError::bad_request(
                "the interview has concluded; request an evaluation instead",
            )),
            (SessionPhase::Completed, _) => Err(InterviewError::bad_request(
                "the session is already completed",
            )),
        }
    }
}
