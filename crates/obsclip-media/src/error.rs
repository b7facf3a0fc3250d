//! Media errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg executable not found")]
    FfmpegNotFound,

    #[error("ffmpeg {}: {message}", exit_label(.exit_code))]
    FfmpegFailed {
        message: String,
        /// Last non-progress stderr lines.
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Input missing: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Nothing to process: {0}")]
    EmptyInput(String),

    #[error("ffmpeg killed after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn stderr(&self) -> Option<&str> {
        match self {
            MediaError::FfmpegFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_names_exit() {
        let err = MediaError::ffmpeg_failed("moov atom not found", Some("tail".into()), Some(1));
        assert_eq!(err.to_string(), "ffmpeg exited with code 1: moov atom not found");
        assert_eq!(err.stderr(), Some("tail"));

        let killed = MediaError::ffmpeg_failed("no output", None, None);
        assert_eq!(killed.to_string(), "ffmpeg terminated by signal: no output");
        assert_eq!(killed.stderr(), None);
    }
}
