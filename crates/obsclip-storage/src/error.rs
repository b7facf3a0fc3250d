//! Object storage errors.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage misconfigured: {0}")]
    ConfigError(String),

    #[error("No such object: {0}")]
    NotFound(String),

    #[error("Upload of {0}")]
    UploadFailed(String),

    #[error("Download of {0}")]
    DownloadFailed(String),

    #[error("Locator has no object key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(locator: impl Into<String>) -> Self {
        Self::NotFound(locator.into())
    }

    /// `what` names the object or file, followed by the cause.
    pub fn upload_failed(what: impl Into<String>) -> Self {
        Self::UploadFailed(what.into())
    }

    pub fn download_failed(what: impl Into<String>) -> Self {
        Self::DownloadFailed(what.into())
    }
}
