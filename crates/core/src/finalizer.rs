use crate::error::InterviewError;
use crate::locks::SessionLocks;
use crate::oracle::{EvaluationOracle, with_timeout};
use crate::report::{EvaluationReply, MIN_TURNS_FOR_EVALUATION, Report, format_transcript};
use crate::session::{InterviewConfig, SessionStatus, ensure_valid_session_id};
use crate::store::{HistoryStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct EvaluationRequest {
    pub session_id: String,
    /// Falls back to the stored role when blank.
    pub role: String,
    pub config: InterviewConfig,
}

/// How the returned report came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// Fresh report from the evaluator, now persisted.
    Evaluated,
    /// The session already had a report; it is returned unchanged.
    AlreadyCompleted,
    /// Too few turns; the fixed failing report, not persisted.
    TooShort,
    /// The evaluator's reply broke the schema; error report, not persisted.
    SchemaError,
    /// The evaluator could not be reached; error report, not persisted.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub report: Report,
    pub outcome: EvaluationOutcome,
}

/// Produces and persists the final report for a session.
pub struct ReportFinalizer {
    store: Arc<dyn HistoryStore>,
    evaluator: Arc<dyn EvaluationOracle>,
    locks: Arc<SessionLocks>,
    oracle_timeout: Duration,
}

impl ReportFinalizer {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        evaluator: Arc<dyn EvaluationOracle>,
        locks: Arc<SessionLocks>,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            evaluator,
            locks,
            oracle_timeout,
        }
    }

    pub async fn finalize(&self, request: EvaluationRequest) -> Result<Evaluation, InterviewError> {
        let session_id = request.session_id.trim().to_string();
        ensure_valid_session_id(&session_id)?;
        let _guard = self.locks.acquire(&session_id).await;

        let session = self.store.get_session(&session_id).await?;
        if let Some(stored) = session.as_ref().and_then(completed_report) {
            info!(%session_id, "Session already evaluated; returning stored report");
            return Ok(Evaluation {
                report: stored,
                outcome: EvaluationOutcome::AlreadyCompleted,
            });
        }

        let Some(session) = session.filter(|s| s.history.len() >= MIN_TURNS_FOR_EVALUATION) else {
            info!(%session_id, "Session too short to evaluate");
            return Ok(Evaluation {
                report: Report::too_short(),
                outcome: EvaluationOutcome::TooShort,
            });
        };

        let role = match request.role.trim() {
            "" => session.role.clone(),
            role => role.to_string(),
        };
        let config = request.config.or(&session.config);
        let transcript = format_transcript(&session.history);

        let reply = EvaluationReply::classify(
            with_timeout(
                self.oracle_timeout,
                self.evaluator.evaluate(&role, &transcript, &config),
            )
            .await,
        );

        match reply {
            EvaluationReply::Parsed(report) => self.persist(&session_id, report).await,
            EvaluationReply::SchemaError(raw) => {
                warn!(%session_id, reply_len = raw.len(), "Evaluation reply did not match the report schema");
                Ok(Evaluation {
                    report: Report::evaluation_failed(),
                    outcome: EvaluationOutcome::SchemaError,
                })
            }
            EvaluationReply::Unavailable(reason) => {
                warn!(%session_id, %reason, "Evaluation oracle unavailable");
                Ok(Evaluation {
                    report: Report::evaluation_failed(),
                    outcome: EvaluationOutcome::Unavailable,
                })
            }
        }
    }

    async fn persist(&self, session_id: &str, report: Report) -> Result<Evaluation, InterviewError> {
        match self.store.save_report(session_id, &report).await {
            Ok(()) => {
                info!(%session_id, verdict = ?report.verdict, "Final report saved");
                Ok(Evaluation {
                    report,
                    outcome: EvaluationOutcome::Evaluated,
                })
            }
            Err(StoreError::AlreadyCompleted(_)) => {
                // Another writer finished first; its report is the one that counts.
                let stored = self
                    .store
                    .get_session(session_id)
                    .await?
                    .as_ref()
                    .and_then(completed_report)
                    .ok_or_else(|| InterviewError::SessionNotFound(session_id.to_string()))?;
                Ok(Evaluation {
                    report: stored,
                    outcome: EvaluationOutcome::AlreadyCompleted,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn completed_report(session: &crate::session::Session) -> Option<Report> {
    match session.status {
        SessionStatus::Completed => session.final_report.clone(),
        SessionStatus::Active => None,
    }
}
