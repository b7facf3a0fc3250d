//! Marker capture.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::markers::append_marker;
use crate::metrics;
use crate::obs::resolve_elapsed_seconds;
use crate::state::AppState;

/// `POST /marker` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerResponse {
    pub success: bool,
    /// Seconds into the recording, two decimals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MarkerResponse {
    pub fn saved(seconds: f64) -> Self {
        Self {
            success: true,
            timestamp: Some(format!("{:.2}", seconds)),
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            timestamp: None,
            message: Some(message.into()),
        }
    }
}

/// Capture the current recording time into the marker file.
pub async fn create_marker(State(state): State<AppState>) -> ApiResult<Json<MarkerResponse>> {
    let result = capture_marker(&state).await;

    match &result {
        Ok(seconds) => {
            metrics::record_marker_request("saved");
            info!(timestamp = *seconds, "Marker saved: {:.2}s", seconds);
        }
        Err(e) => {
            metrics::record_marker_request(e.outcome());
            warn!(outcome = e.outcome(), "Marker not saved: {}", e);
        }
    }

    Ok(Json(MarkerResponse::saved(result?)))
}

/// Resolve the elapsed recording time and append it.
///
/// Always asks OBS for a fresh status rather than trusting the cached
/// recording flag.
pub async fn capture_marker(state: &AppState) -> ApiResult<f64> {
    let recorder = &state.recorder;
    if !recorder.is_connected() {
        return Err(ApiError::NotConnected);
    }

    let status = recorder
        .record_status()
        .await
        .map_err(ApiError::StatusUnavailable)?;
    if !status.output_active {
        return Err(ApiError::NotRecording);
    }

    let seconds = resolve_elapsed_seconds(&status).ok_or(ApiError::TimeUnavailable)?;
    append_marker(&state.config.marker_file, seconds).await?;
    Ok(seconds)
}
