//! Storage locators of the form `storage://<bucket>/<path>`.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SCHEME: &str = "storage://";

/// Records written by the original GCS tooling use `gs://`.
const LEGACY_SCHEME: &str = "gs://";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("malformed storage locator: {0:?}")]
    Malformed(String),
}

/// Address of one object in one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct StorageLocator {
    pub bucket: String,
    pub path: String,
}

impl StorageLocator {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
        }
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

impl FromStr for StorageLocator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SCHEME)
            .or_else(|| s.strip_prefix(LEGACY_SCHEME))
            .ok_or_else(|| LocatorError::Malformed(s.to_string()))?;

        match rest.split_once('/') {
            Some((bucket, path)) if !bucket.is_empty() && !path.is_empty() => {
                Ok(Self::new(bucket, path))
            }
            _ => Err(LocatorError::Malformed(s.to_string())),
        }
    }
}

impl fmt::Display for StorageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", SCHEME, self.bucket, self.path)
    }
}
