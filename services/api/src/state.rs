use interview_core::locks::SessionLocks;
use interview_core::oracle::{EvaluationOracle, QuestionOracle, Transcriber};
use interview_core::{HistoryStore, ReportFinalizer, SessionController};
use std::sync::Arc;
use std::time::Duration;

/// Everything the handlers need, built once at startup.
pub struct AppState {
    pub controller: SessionController,
    pub finalizer: ReportFinalizer,
    pub transcriber: Arc<dyn Transcriber>,
    pub store: Arc<dyn HistoryStore>,
    pub oracle_timeout: Duration,
}

impl AppState {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        questions: Arc<dyn QuestionOracle>,
        evaluator: Arc<dyn EvaluationOracle>,
        transcriber: Arc<dyn Transcriber>,
        oracle_timeout: Duration,
    ) -> Self {
        // Generating and evaluating share one lock per session.
        let locks = Arc::new(SessionLocks::new());
        Self {
            controller: SessionController::new(
                store.clone(),
                questions,
                locks.clone(),
                oracle_timeout,
            ),
            finalizer: ReportFinalizer::new(store.clone(), evaluator, locks, oracle_timeout),
            transcriber,
            store,
            oracle_timeout,
        }
    }
}
