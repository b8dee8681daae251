//! Session lifecycle and turn advancement for AI-conducted mock interviews.

pub mod audio;
pub mod controller;
pub mod error;
pub mod file_store;
pub mod finalizer;
pub mod locks;
pub mod openai;
pub mod oracle;
pub mod prompts;
pub mod report;
pub mod scripted;
pub mod session;
pub mod store;

pub use controller::{FALLBACK_QUESTION, SessionController, TurnReply, TurnRequest};
pub use error::InterviewError;
pub use finalizer::{Evaluation, EvaluationOutcome, EvaluationRequest, ReportFinalizer};
pub use report::{Report, Verdict};
pub use session::{InterviewConfig, Session, SessionStatus, Turn};
pub use store::{HistoryStore, InMemoryHistoryStore, StoreError};
