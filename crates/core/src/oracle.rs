use crate::audio::AudioClip;
use crate::session::{InterviewConfig, Turn};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle unreachable: {0}")]
    Unavailable(String),
    #[error("oracle timed out after {0:?}")]
    TimedOut(Duration),
    /// The oracle answered, but with content that cannot be used. Carries the
    /// raw reply.
    #[error("oracle returned malformed output: {0}")]
    Malformed(String),
}

// The oracles are the external text generators the interview depends on.
// Everything that talks to them goes through these traits so the controller
// and finalizer can run against mocks in tests and against either the
// OpenAI-backed or the scripted provider at runtime.

/// Produces the next interview question.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QuestionOracle: Send + Sync {
    /// `history` is empty when the interview is starting.
    async fn next_question(
        &self,
        role: &str,
        history: &[Turn],
        config: &InterviewConfig,
    ) -> Result<String, OracleError>;
}

/// Scores a finished interview. Returns the raw JSON reply; validation is the
/// caller's job.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EvaluationOracle: Send + Sync {
    async fn evaluate(
        &self,
        role: &str,
        transcript: &str,
        config: &InterviewConfig,
    ) -> Result<String, OracleError>;
}

/// Turns a recorded answer into text.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String, OracleError>;
}

/// Bounds an oracle call by `limit`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, OracleError>
where
    F: Future<Output = Result<T, OracleError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(OracleError::TimedOut(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, OracleError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let limit = Duration::from_millis(20);
        let result = with_timeout(limit, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, OracleError>(())
        })
        .await;
        assert_eq!(result, Err(OracleError::TimedOut(limit)));
    }
}
