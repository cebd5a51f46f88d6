use std::path::Path;

use axum::{Json, extract::State};
use serde::Deserialize;
use tracing::info;
use whisperfleet_transcription::{PoolStatus, TaskKind, Transcript};

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    /// WAV file readable by the server.
    pub path: String,
    /// Language code, or "auto" to detect.
    pub language: Option<String>,
    /// "transcribe" (default) or "translate".
    pub task: Option<String>,
    #[serde(default)]
    pub multi_device: bool,
}

pub async fn transcribe(
    State(state): State<AppState>,
    Json(body): Json<TranscribeRequest>,
) -> Result<Json<Transcript>, ApiError> {
    if body.path.trim().is_empty() {
        return Err(ApiError::BadRequest("path is required".to_string()));
    }
    let task = body
        .task
        .as_deref()
        .map(str::parse::<TaskKind>)
        .transpose()?
        .unwrap_or_default();

    info!(path = %body.path, ?task, multi_device = body.multi_device, "Transcription requested");
    let transcript = state
        .service
        .transcribe_file(
            Path::new(&body.path),
            body.language.as_deref(),
            task,
            body.multi_device,
        )
        .await?;

    Ok(Json(transcript))
}

pub async fn pool_status(State(state): State<AppState>) -> Json<PoolStatus> {
    Json(state.service.pool().status())
}
