//! Worker error types.

use thiserror::Error;

use obsclip_models::{LocatorError, Stage};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Nothing produced for stage {stage}: {reason}")]
    NoOutput { stage: Stage, reason: String },

    #[error("Invalid locator: {0}")]
    Locator(#[from] LocatorError),

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] obsclip_storage::StorageError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] obsclip_firestore::FirestoreError),

    #[error("Media error: {0}")]
    Media(#[from] obsclip_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn no_output(stage: Stage, reason: impl Into<String>) -> Self {
        Self::NoOutput {
            stage,
            reason: reason.into(),
        }
    }
}
