//! Connection status.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub connected: bool,
    pub recording: bool,
    pub marker_file: String,
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        connected: state.recorder.is_connected(),
        recording: state.recorder.is_recording(),
        marker_file: state.config.marker_file.display().to_string(),
    })
}
