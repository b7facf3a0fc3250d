//! Firestore error types.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use obsclip_models::TransitionError;

/// Result type for Firestore operations.
pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Wait applied to a throttled call that did not say how long to back off.
const DEFAULT_THROTTLE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum FirestoreError {
    #[error("Firestore credentials unavailable: {0}")]
    Credentials(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Stale write rejected: {0}")]
    PreconditionFailed(String),

    #[error("Firestore rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Firestore unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Throttled by Firestore, retry in {0:?}")]
    Throttled(Duration),

    #[error("Malformed Firestore response: {0}")]
    InvalidResponse(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),
}

/// `{"error": {...}}` envelope Google APIs put on failed calls.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl FirestoreError {
    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::Credentials(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Classify a failed HTTP response.
    ///
    /// The canonical status inside the body wins over the HTTP status, so a
    /// 400 carrying `FAILED_PRECONDITION` becomes a stale-write error.
    pub fn from_response(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let (canonical, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => (envelope.error.status, envelope.error.message),
            Err(_) => (String::new(), body.trim().to_string()),
        };

        match (canonical.as_str(), status) {
            ("FAILED_PRECONDITION", _) | ("ABORTED", _) | (_, 412) => {
                Self::PreconditionFailed(message)
            }
            ("ALREADY_EXISTS", _) | (_, 409) => Self::AlreadyExists(message),
            ("NOT_FOUND", _) | (_, 404) => Self::NotFound(message),
            ("RESOURCE_EXHAUSTED", _) | (_, 429) => {
                Self::Throttled(retry_after.unwrap_or(DEFAULT_THROTTLE))
            }
            (_, 500..=599) => Self::Unavailable { status, message },
            _ => Self::Rejected { status, message },
        }
    }

    /// Classify the per-write status of a batch write (gRPC canonical codes).
    pub fn from_write_status(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            5 => Self::NotFound(message),
            6 => Self::AlreadyExists(message),
            9 | 10 => Self::PreconditionFailed(message),
            8 => Self::Throttled(DEFAULT_THROTTLE),
            4 | 13 | 14 => Self::Unavailable {
                status: 503,
                message,
            },
            7 => Self::Rejected {
                status: 403,
                message,
            },
            16 => Self::Rejected {
                status: 401,
                message,
            },
            _ => Self::Rejected {
                status: 400,
                message: format!("{} (code {})", message, code),
            },
        }
    }

    /// HTTP status used as the metrics label for this failure.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Credentials(_) => Some(401),
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) => Some(409),
            Self::PreconditionFailed(_) => Some(412),
            Self::Throttled(_) => Some(429),
            Self::Rejected { status, .. } | Self::Unavailable { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Server-requested wait before the next attempt.
    pub fn backoff_hint(&self) -> Option<Duration> {
        match self {
            Self::Throttled(wait) => Some(*wait),
            _ => None,
        }
    }

    /// Network failures, throttling and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Throttled(_) | Self::Unavailable { .. }
        )
    }

    /// The write lost an `updateTime` or existence check.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed(_))
    }
}
