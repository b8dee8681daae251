use axum::Json;
use axum::extract::FromRequest;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use interview_core::{InterviewError, StoreError};
use serde_json::json;

/// Maps core errors and rejected request bodies onto HTTP responses with a
/// `{"detail": ...}` body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Interview(#[from] InterviewError),
    #[error("{}", .0.body_text())]
    Body(#[from] JsonRejection),
}

/// `axum::Json` whose rejections are reported as [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            // Oversized uploads keep their 413; any other body problem is
            // malformed input.
            ApiError::Body(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ApiError::Body(_) => StatusCode::BAD_REQUEST,
            ApiError::Interview(error) => match error {
                InterviewError::BadRequest(_) | InterviewError::Audio(_) => StatusCode::BAD_REQUEST,
                InterviewError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                InterviewError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                InterviewError::Store(StoreError::InvalidId(_)) => StatusCode::BAD_REQUEST,
                InterviewError::Store(StoreError::Unavailable(_)) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                InterviewError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed with {}: {}", status, self);
        } else {
            tracing::info!("Request rejected with {}: {}", status, self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
