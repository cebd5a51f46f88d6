use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use whisperfleet_transcription::TranscribeError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    ServiceUnavailable(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<TranscribeError> for ApiError {
    fn from(err: TranscribeError) -> Self {
        match err {
            TranscribeError::Config(_) | TranscribeError::Audio(_) => {
                ApiError::BadRequest(err.to_string())
            }
            TranscribeError::PoolExhausted { .. } | TranscribeError::PoolShutdown => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            TranscribeError::WorkerInit { .. }
            | TranscribeError::Vad(_)
            | TranscribeError::Session(_) => ApiError::Internal(err.to_string()),
        }
    }
}
