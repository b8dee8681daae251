use crate::audio::AudioError;
use crate::store::StoreError;

/// Errors surfaced by the session controller, the report finalizer and the
/// transcription pipeline.
///
/// Oracle failures for question generation and evaluation never show up here:
/// those are absorbed into degraded responses. Only transcription, which has
/// no safe fallback content, reports `ServiceUnavailable`.
#[derive(Debug, thiserror::Error)]
pub enum InterviewError {
    /// The caller violated a precondition of the turn state machine.
    #[error("{0}")]
    BadRequest(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("{service} service is unavailable: {reason}")]
    ServiceUnavailable {
        service: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl InterviewError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}
