use crate::error::{ApiError, ApiJson};
use crate::state::AppState;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use interview_core::audio::{SpeechFeatures, transcribe_answer};
use interview_core::{
    EvaluationRequest, InterviewConfig, InterviewError, Report, Session, TurnRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Body of `POST /interview/generate_question`. Omit `user_answer` to start
/// or resume a session.
#[derive(Debug, Deserialize)]
pub struct InterviewRequest {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub role: String,
    pub user_answer: Option<String>,
    pub difficulty: Option<String>,
    pub job_description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InterviewResponse {
    pub session_id: String,
    pub ai_question: String,
    pub is_complete: bool,
}

/// Body of `POST /interview/evaluate`.
#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub session_id: String,
    #[serde(default)]
    pub role: String,
    /// Accepted for compatibility; the stored history is what gets graded.
    pub full_transcript: Option<String>,
    pub difficulty: Option<String>,
    pub job_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionRequest {
    #[serde(default = "unassigned_session")]
    pub session_id: String,
    pub audio_data_uri: String,
}

fn unassigned_session() -> String {
    "temp_id".to_string()
}

#[derive(Debug, Serialize)]
pub struct TranscriptionResponse {
    pub session_id: String,
    pub transcript: String,
    pub duration_sec: f64,
    pub audio_features: SpeechFeatures,
}

/// Upper bound for a transcription request body. Covers the 25 MB audio
/// files the transcription API accepts once base64 encoded.
pub const MAX_AUDIO_BODY_BYTES: usize = 40 * 1024 * 1024;

/// Builds the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    // Permissive CORS so a separately served frontend can call the API.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let interview = Router::new()
        .route("/generate_question", post(generate_question))
        .route("/evaluate", post(evaluate))
        .route(
            "/transcribe",
            post(transcribe).layer(DefaultBodyLimit::max(MAX_AUDIO_BODY_BYTES)),
        )
        .route("/sessions/{session_id}", get(get_session));

    Router::new()
        .route("/health", get(health))
        .nest("/interview", interview)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": "AI Mock Interview Backend" }))
}

async fn generate_question(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<InterviewRequest>,
) -> Result<Json<InterviewResponse>, ApiError> {
    let reply = state
        .controller
        .generate_question(TurnRequest {
            session_id: req.session_id,
            user_id: req.user_id,
            role: req.role,
            user_answer: req.user_answer,
            config: InterviewConfig {
                difficulty: req.difficulty,
                job_description: req.job_description,
            },
        })
        .await?;

    Ok(Json(InterviewResponse {
        session_id: reply.session_id,
        ai_question: reply.question,
        is_complete: reply.is_complete,
    }))
}

async fn evaluate(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<EvaluateRequest>,
) -> Result<Json<Report>, ApiError> {
    if req.full_transcript.as_deref().is_some_and(|t| !t.trim().is_empty()) {
        debug!(session_id = %req.session_id, "Ignoring client transcript; grading stored history");
    }

    let evaluation = state
        .finalizer
        .finalize(EvaluationRequest {
            session_id: req.session_id,
            role: req.role,
            config: InterviewConfig {
                difficulty: req.difficulty,
                job_description: req.job_description,
            },
        })
        .await?;
    debug!(outcome = ?evaluation.outcome, "Evaluation finished");

    Ok(Json(evaluation.report))
}

async fn transcribe(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<TranscriptionRequest>,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    let answer = transcribe_answer(
        state.transcriber.as_ref(),
        &req.audio_data_uri,
        state.oracle_timeout,
    )
    .await?;

    Ok(Json(TranscriptionResponse {
        session_id: req.session_id,
        transcript: answer.transcript,
        duration_sec: answer.duration_secs,
        audio_features: answer.features,
    }))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let session = state
        .store
        .get_session(&session_id)
        .await
        .map_err(InterviewError::from)?
        .ok_or(InterviewError::SessionNotFound(session_id))?;
    Ok(Json(session))
}
