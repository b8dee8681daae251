use crate::error::InterviewError;
use crate::locks::SessionLocks;
use crate::oracle::{QuestionOracle, with_timeout};
use crate::session::{
    ANONYMOUS_USER, InterviewConfig, SessionPhase, Transition, Turn, ensure_valid_session_id,
    signals_stop,
};
use crate::store::HistoryStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Asked whenever the question oracle fails, times out or returns nothing.
pub const FALLBACK_QUESTION: &str =
    "Could you walk me through a recent technical challenge you faced and how you approached it?";

/// A request for the next interview question.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    /// Generated when absent.
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    /// May be blank once the session exists; the stored role is used then.
    pub role: String,
    pub user_answer: Option<String>,
    pub config: InterviewConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub session_id: String,
    pub question: String,
    pub is_complete: bool,
}

/// Drives a session from one question to the next.
///
/// Every request reads the stored session, derives its [`SessionPhase`],
/// applies the transition table and performs the resulting store writes
/// while holding the session's lock.
pub struct SessionController {
    store: Arc<dyn HistoryStore>,
    questions: Arc<dyn QuestionOracle>,
    locks: Arc<SessionLocks>,
    oracle_timeout: Duration,
}

impl SessionController {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        questions: Arc<dyn QuestionOracle>,
        locks: Arc<SessionLocks>,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            questions,
            locks,
            oracle_timeout,
        }
    }

    pub async fn generate_question(&self, request: TurnRequest) -> Result<TurnReply, InterviewError> {
        let session_id = match request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        ensure_valid_session_id(&session_id)?;
        let answer = request
            .user_answer
            .as_deref()
            .map(str::trim)
            .filter(|answer| !answer.is_empty());

        let _guard = self.locks.acquire(&session_id).await;

        let session = self.store.get_session(&session_id).await?;
        let role = match request.role.trim() {
            "" => session
                .as_ref()
                .map(|s| s.role.clone())
                .ok_or_else(|| InterviewError::bad_request("role must not be empty"))?,
            role => role.to_string(),
        };
        let config = match &session {
            Some(session) => request.config.or(&session.config),
            None => request.config,
        };

        let transition = SessionPhase::of(session.as_ref()).transition(answer)?;
        let question = match transition {
            Transition::Start { create_record } => {
                if create_record {
                    let user_id = request
                        .user_id
                        .as_deref()
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .unwrap_or(ANONYMOUS_USER);
                    self.store
                        .create_session(&session_id, &role, user_id, &config)
                        .await?;
                    info!(%session_id, %role, "Interview session started");
                } else {
                    info!(%session_id, "Restarting session that has no questions yet");
                }
                self.ask_and_append(&session_id, &role, &[], &config).await?
            }
            Transition::Resume { question } => {
                info!(%session_id, "Resending outstanding question");
                question
            }
            Transition::Answer { question, answer } => {
                self.store
                    .update_last_turn_answer(&session_id, &question, &answer)
                    .await?;
                let history = self.store.get_history(&session_id).await?;
                info!(%session_id, turns = history.len(), "Answer recorded");
                self.ask_and_append(&session_id, &role, &history, &config)
                    .await?
            }
            Transition::Regenerate => {
                let history = self.store.get_history(&session_id).await?;
                warn!(%session_id, turns = history.len(), "Last answer has no follow-up question; regenerating");
                self.ask_and_append(&session_id, &role, &history, &config)
                    .await?
            }
        };

        let is_complete = signals_stop(&question);
        if is_complete {
            info!(%session_id, "Interviewer signalled the end of the interview");
        }
        Ok(TurnReply {
            session_id,
            question,
            is_complete,
        })
    }

    async fn ask_and_append(
        &self,
        session_id: &str,
        role: &str,
        history: &[Turn],
        config: &InterviewConfig,
    ) -> Result<String, InterviewError> {
        let question = self.ask(session_id, role, history, config).await;
        self.store.append_turn(session_id, &question, "").await?;
        Ok(question)
    }

    async fn ask(
        &self,
        session_id: &str,
        role: &str,
        history: &[Turn],
        config: &InterviewConfig,
    ) -> String {
        let call = self.questions.next_question(role, history, config);
        match with_timeout(self.oracle_timeout, call).await {
            Ok(question) if !question.trim().is_empty() => question.trim().to_string(),
            Ok(_) => {
                warn!(%session_id, "Question oracle returned an empty question; using fallback");
                FALLBACK_QUESTION.to_string()
            }
            Err(e) => {
                warn!(%session_id, error = %e, "Question oracle failed; using fallback");
                FALLBACK_QUESTION.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{MockQuestionOracle, OracleError};
    use crate::store::InMemoryHistoryStore;

    fn controller(store: Arc<InMemoryHistoryStore>, oracle: MockQuestionOracle) -> SessionController {
        SessionController::new(
            store,
            Arc::new(oracle),
            Arc::new(SessionLocks::new()),
            Duration::from_millis(200),
        )
    }

    fn request(answer: Option<&str>) -> TurnRequest {
        TurnRequest {
            session_id: Some("s1".to_string()),
            user_id: None,
            role: "Data Analyst".to_string(),
            user_answer: answer.map(str::to_string),
            config: InterviewConfig::default(),
        }
    }

    fn assert_single_open_turn_at_end(history: &[Turn]) {
        let open: Vec<usize> = history
            .iter()
            .enumerate()
            .filter(|(_, turn)| !turn.is_answered())
            .map(|(idx, _)| idx)
            .collect();
        assert!(open.len() <= 1, "more than one open turn: {history:?}");
        if let Some(idx) = open.first() {
            assert_eq!(*idx, history.len() - 1, "open turn is not last: {history:?}");
        }
    }

    #[tokio::test]
    async fn test_start_creates_session_and_first_turn() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let mut oracle = MockQuestionOracle::new();
        oracle
            .expect_next_question()
            .withf(|role, history, _| role == "Data Analyst" && history.is_empty())
            .returning(|_, _, _| Ok("Q1".to_string()))
            .once();

        let reply = controller(store.clone(), oracle)
            .generate_question(request(None))
            .await
            .unwrap();

        assert_eq!(reply.question, "Q1");
        assert!(!reply.is_complete);
        let session = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(session.user_id, ANONYMOUS_USER);
        assert_eq!(session.history, vec![Turn::new("Q1", "")]);
    }

    #[tokio::test]
    async fn test_repeated_start_resumes_instead_of_duplicating() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let mut oracle = MockQuestionOracle::new();
        oracle
            .expect_next_question()
            .returning(|_, _, _| Ok("Q1".to_string()))
            .once();
        let controller = controller(store.clone(), oracle);

        let first = controller.generate_question(request(None)).await.unwrap();
        let second = controller.generate_question(request(None)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.get_history("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_answer_fills_turn_in_place_and_appends_next() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let mut oracle = MockQuestionOracle::new();
        oracle
            .expect_next_question()
            .withf(|_, history, _| history.is_empty())
            .returning(|_, _, _| Ok("Q1".to_string()))
            .once();
        oracle
            .expect_next_question()
            .withf(|_, history, _| history == [Turn::new("Q1", "A1")])
            .returning(|_, _, _| Ok("Q2".to_string()))
            .once();
        let controller = controller(store.clone(), oracle);

        controller.generate_question(request(None)).await.unwrap();
        let reply = controller
            .generate_question(request(Some("  A1 ")))
            .await
            .unwrap();

        assert_eq!(reply.question, "Q2");
        let history = store.get_history("s1").await.unwrap();
        assert_eq!(history, vec![Turn::new("Q1", "A1"), Turn::new("Q2", "")]);
        assert_single_open_turn_at_end(&history);
    }

    #[tokio::test]
    async fn test_answer_without_session_is_bad_request() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let mut oracle = MockQuestionOracle::new();
        oracle.expect_next_question().never();

        let err = controller(store.clone(), oracle)
            .generate_question(request(Some("A1")))
            .await
            .unwrap_err();

        assert!(matches!(err, InterviewError::BadRequest(_)));
        assert!(store.get_session("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stop_token_marks_completion() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let mut oracle = MockQuestionOracle::new();
        oracle
            .expect_next_question()
            .returning(|_, history, _| {
                Ok(if history.is_empty() {
                    "Q1".to_string()
                } else {
                    "Great talking to you. stop".to_string()
                })
            });
        let controller = controller(store.clone(), oracle);

        let first = controller.generate_question(request(None)).await.unwrap();
        assert!(!first.is_complete);
        let last = controller
            .generate_question(request(Some("A1")))
            .await
            .unwrap();
        assert!(last.is_complete);

        // Resuming a concluded interview repeats the closing line.
        let resumed = controller.generate_question(request(None)).await.unwrap();
        assert_eq!(resumed, last);
        let err = controller
            .generate_question(request(Some("one more thing")))
            .await
            .unwrap_err();
        assert!(matches!(err, InterviewError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_oracle_failure_degrades_to_fallback() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let mut oracle = MockQuestionOracle::new();
        oracle
            .expect_next_question()
            .returning(|_, _, _| Err(OracleError::Unavailable("connection refused".to_string())));

        let reply = controller(store.clone(), oracle)
            .generate_question(request(None))
            .await
            .unwrap();

        assert_eq!(reply.question, FALLBACK_QUESTION);
        assert!(!reply.is_complete);
        assert_eq!(
            store.get_history("s1").await.unwrap(),
            vec![Turn::new(FALLBACK_QUESTION, "")]
        );
    }

    struct SlowOracle;

    #[async_trait::async_trait]
    impl QuestionOracle for SlowOracle {
        async fn next_question(
            &self,
            _role: &str,
            _history: &[Turn],
            _config: &InterviewConfig,
        ) -> Result<String, OracleError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test]
    async fn test_slow_oracle_times_out_to_fallback() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let controller = SessionController::new(
            store,
            Arc::new(SlowOracle),
            Arc::new(SessionLocks::new()),
            Duration::from_millis(20),
        );

        let reply = controller.generate_question(request(None)).await.unwrap();
        assert_eq!(reply.question, FALLBACK_QUESTION);
    }

    #[tokio::test]
    async fn test_lost_follow_up_is_regenerated() {
        let store = Arc::new(InMemoryHistoryStore::new());
        store
            .create_session("s1", "Data Analyst", "guest", &InterviewConfig::default())
            .await
            .unwrap();
        // A crash after the answer was written but before Q2 was appended.
        store.append_turn("s1", "Q1", "A1").await.unwrap();

        let mut oracle = MockQuestionOracle::new();
        oracle
            .expect_next_question()
            .withf(|_, history, _| history.len() == 1)
            .returning(|_, _, _| Ok("Q2".to_string()))
            .once();

        let reply = controller(store.clone(), oracle)
            .generate_question(request(Some("A1")))
            .await
            .unwrap();

        assert_eq!(reply.question, "Q2");
        assert_eq!(
            store.get_history("s1").await.unwrap(),
            vec![Turn::new("Q1", "A1"), Turn::new("Q2", "")]
        );
    }

    #[tokio::test]
    async fn test_generated_session_id_and_stored_role() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let mut oracle = MockQuestionOracle::new();
        oracle
            .expect_next_question()
            .withf(|role, _, _| role == "Data Analyst")
            .returning(|_, _, _| Ok("Q".to_string()))
            .times(2);
        let controller = controller(store.clone(), oracle);

        let started = controller
            .generate_question(TurnRequest {
                session_id: None,
                ..request(None)
            })
            .await
            .unwrap();
        assert!(Uuid::parse_str(&started.session_id).is_ok());

        // Follow-ups may omit the role.
        let next = controller
            .generate_question(TurnRequest {
                session_id: Some(started.session_id.clone()),
                role: String::new(),
                user_answer: Some("A1".to_string()),
                ..TurnRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(next.session_id, started.session_id);
    }

    #[tokio::test]
    async fn test_concurrent_answers_keep_one_open_turn() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let mut oracle = MockQuestionOracle::new();
        oracle
            .expect_next_question()
            .returning(|_, history, _| Ok(format!("Q{}", history.len() + 1)));
        let controller = Arc::new(controller(store.clone(), oracle));
        controller.generate_question(request(None)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let controller = controller.clone();
            handles.push(tokio::spawn(async move {
                controller.generate_question(request(Some("same answer"))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Serialized: each request answered exactly one outstanding question.
        let history = store.get_history("s1").await.unwrap();
        assert_eq!(history.len(), 9);
        assert_single_open_turn_at_end(&history);
    }
}
