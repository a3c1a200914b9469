use super::state::AppState;
use crate::compositor::{Layout, LayoutPreset};
use crate::session::{SessionError, SessionStats};
use crate::webcam::WebcamStatus;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub session_id: Uuid,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub artifact_id: Uuid,
    pub preview_url: String,
    pub content_type: String,
    pub size: usize,
    pub duration_secs: u64,
    pub stats: Option<SessionStats>,
}

#[derive(Debug, Serialize)]
pub struct WebcamResponse {
    pub enabled: bool,
    pub status: WebcamStatus,
}

/// Either a named preset or explicit coordinates
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LayoutRequest {
    Preset { preset: LayoutPreset },
    Custom { x: f64, y: f64, size: f64 },
}

#[derive(Debug, Serialize)]
pub struct LayoutResponse {
    pub target: Layout,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn session_error_status(error: &SessionError) -> StatusCode {
    match error {
        SessionError::AlreadyStarted | SessionError::AlreadyStopped | SessionError::WebcamLocked => {
            StatusCode::CONFLICT
        }
        SessionError::NotRecording => StatusCode::NOT_FOUND,
        SessionError::DisplayCapture(_) => StatusCode::FORBIDDEN,
        SessionError::NoDataRecorded | SessionError::NoSupportedFormat => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /recording/start
/// Start a new capture session
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    info!("Starting recording");

    match state.studio.start_recording().await {
        Ok(session) => (
            StatusCode::OK,
            Json(StartRecordingResponse {
                session_id: session.id(),
                status: session.state().to_string(),
                message: format!("Recording started ({})", session.id()),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start recording: {}", e);
            error_response(session_error_status(&e), format!("Failed to start recording: {}", e))
        }
    }
}

/// POST /recording/stop
/// Stop the current session and report the artifact
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stopping recording");

    match state.studio.stop_recording().await {
        Ok(artifact) => (
            StatusCode::OK,
            Json(StopRecordingResponse {
                artifact_id: artifact.id,
                preview_url: artifact.preview_url.clone(),
                content_type: artifact.content_type.clone(),
                size: artifact.size,
                duration_secs: artifact.duration_secs,
                stats: state.studio.current_session().map(|s| s.stats()),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to stop recording: {}", e);
            error_response(session_error_status(&e), format!("Failed to stop recording: {}", e))
        }
    }
}

/// GET /recording/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.studio.status())).into_response()
}

/// POST /webcam/toggle
pub async fn toggle_webcam(State(state): State<AppState>) -> impl IntoResponse {
    match state.studio.toggle_webcam().await {
        Ok(enabled) => (
            StatusCode::OK,
            Json(WebcamResponse {
                enabled,
                status: state.studio.webcam().status(),
            }),
        )
            .into_response(),
        Err(e) => error_response(session_error_status(&e), e),
    }
}

/// PUT /layout
/// Untrusted coordinates are clamped into range
pub async fn set_layout(
    State(state): State<AppState>,
    Json(req): Json<LayoutRequest>,
) -> impl IntoResponse {
    let target = match req {
        LayoutRequest::Preset { preset } => preset.layout(),
        LayoutRequest::Custom { x, y, size } => Layout { x, y, size }.clamped(),
    };
    state.studio.set_layout(target);

    (StatusCode::OK, Json(LayoutResponse { target })).into_response()
}

/// GET /artifacts/:artifact_id
/// Download the last finished recording
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(artifact_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.studio.artifact(artifact_id) {
        Some(artifact) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, artifact.content_type.clone())],
            artifact.bytes().clone(),
        )
            .into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("Artifact {} not found", artifact_id),
        ),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
