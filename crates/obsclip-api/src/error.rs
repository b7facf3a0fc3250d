//! Marker server error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::handlers::MarkerResponse;

pub type ApiResult<T> = Result<T, ApiError>;
pub type ObsResult<T> = Result<T, ObsError>;

/// Errors from the OBS WebSocket connection.
#[derive(Debug, Error)]
pub enum ObsError {
    #[error("not connected")]
    NotConnected,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("OBS requires a password but OBS_WS_PASSWORD is not set")]
    PasswordRequired,

    #[error("{request_type} failed with code {code}: {comment}")]
    RequestFailed {
        request_type: String,
        code: i64,
        comment: String,
    },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("connection closed")]
    Closed,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

impl ObsError {
    pub fn connect(msg: impl Into<String>) -> Self {
        Self::Connect(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Whether reconnecting may clear the error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ObsError::PasswordRequired)
    }
}

/// Marker capture failures and routing errors.
///
/// The display strings of the capture variants are the operator-facing
/// messages returned by `POST /marker`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not connected to OBS WebSocket")]
    NotConnected,

    #[error("Could not check recording status: {0}")]
    StatusUnavailable(ObsError),

    #[error("Not recording. Start recording in OBS first.")]
    NotRecording,

    #[error("Could not get recording time from OBS")]
    TimeUnavailable,

    #[error("Failed to save marker to file")]
    MarkerFile(#[from] std::io::Error),

    #[error("Not Found")]
    NotFound,
}

impl ApiError {
    /// Metrics label for the capture outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            ApiError::NotConnected => "not_connected",
            ApiError::StatusUnavailable(_) => "status_failed",
            ApiError::NotRecording => "not_recording",
            ApiError::TimeUnavailable => "time_unavailable",
            ApiError::MarkerFile(_) => "write_failed",
            ApiError::NotFound => "not_found",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            // Capture failures are reported in the body
            _ => StatusCode::OK,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::NotFound => (status, "Not Found").into_response(),
            other => (status, Json(MarkerResponse::failure(other.to_string()))).into_response(),
        }
    }
}
