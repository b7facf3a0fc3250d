//! Object store client over the S3 API.
//!
//! Defaults to the Google Cloud Storage interoperability endpoint with HMAC
//! keys; any S3-compatible endpoint works.

use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use obsclip_models::StorageLocator;

use crate::error::{StorageError, StorageResult};

/// GCS XML API endpoint that accepts S3-style requests.
pub const DEFAULT_ENDPOINT_URL: &str = "https://storage.googleapis.com";

/// Configuration for the storage client.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// HMAC access key ID
    pub access_key_id: String,
    /// HMAC secret
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Signing region ("auto" works for GCS)
    pub region: String,
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let required = |key: &str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| StorageError::config_error(format!("{} not set", key)))
        };

        Ok(Self {
            endpoint_url: std::env::var("STORAGE_ENDPOINT_URL")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT_URL.to_string()),
            access_key_id: required("STORAGE_ACCESS_KEY_ID")?,
            secret_access_key: required("STORAGE_SECRET_ACCESS_KEY")?,
            bucket_name: required("STORAGE_BUCKET")?,
            region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Object store client bound to one bucket for uploads.
#[derive(Clone)]
pub struct StorageClient {
    client: Client,
    bucket: String,
}

impl StorageClient {
    /// Create a new client from configuration.
    pub fn new(config: StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "obsclip",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(StorageConfig::from_env()?))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload a file, streaming it from disk, and return its locator.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
        metadata: &[(&str, &str)],
    ) -> StorageResult<StorageLocator> {
        let path = path.as_ref();
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{} failed: {}", path.display(), e)))?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type);

        for (name, value) in metadata {
            request = request.metadata(*name, *value);
        }

        request
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(format!("{} failed: {}", key, DisplayErrorContext(&e))))?;

        let locator = StorageLocator::new(&self.bucket, key);
        info!("Uploaded {} to {}", path.display(), locator);
        Ok(locator)
    }

    /// Download an object to a file, streaming the body.
    ///
    /// A partially written file is removed on failure.
    pub async fn download_file(
        &self,
        locator: &StorageLocator,
        path: impl AsRef<Path>,
    ) -> StorageResult<u64> {
        let path = path.as_ref();
        debug!("Downloading {} to {}", locator, path.display());

        match self.stream_to_file(locator, path).await {
            Ok(written) => {
                info!("Downloaded {} to {} ({} bytes)", locator, path.display(), written);
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(path).await;
                Err(e)
            }
        }
    }

    async fn stream_to_file(&self, locator: &StorageLocator, path: &Path) -> StorageResult<u64> {
        if locator.path.is_empty() {
            return Err(StorageError::InvalidKey(locator.to_string()));
        }

        let response = self
            .client
            .get_object()
            .bucket(&locator.bucket)
            .key(&locator.path)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::not_found(locator.to_string())
                } else {
                    StorageError::download_failed(format!("{} failed: {}", locator, DisplayErrorContext(&e)))
                }
            })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut body = response.body;
        let mut written = 0u64;

        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| StorageError::download_failed(format!("{} failed mid-stream: {}", locator, e)))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 5] = [
        "STORAGE_ENDPOINT_URL",
        "STORAGE_ACCESS_KEY_ID",
        "STORAGE_SECRET_ACCESS_KEY",
        "STORAGE_BUCKET",
        "STORAGE_REGION",
    ];

    #[test]
    #[serial]
    fn test_config_requires_credentials() {
        for var in VARS {
            std::env::remove_var(var);
        }
        std::env::set_var("STORAGE_BUCKET", "obs-pipeline-videos");

        let err = StorageConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("STORAGE_ACCESS_KEY_ID"));
    }

    #[test]
    #[serial]
    fn test_config_defaults_to_gcs_endpoint() {
        for var in VARS {
            std::env::remove_var(var);
        }
        std::env::set_var("STORAGE_ACCESS_KEY_ID", "GOOG1EXAMPLE");
        std::env::set_var("STORAGE_SECRET_ACCESS_KEY", "secret");
        std::env::set_var("STORAGE_BUCKET", "obs-pipeline-videos");

        let config = StorageConfig::from_env().unwrap();
        assert_eq!(config.endpoint_url, DEFAULT_ENDPOINT_URL);
        assert_eq!(config.region, "auto");

        let client = StorageClient::new(config);
        assert_eq!(client.bucket(), "obs-pipeline-videos");
    }
}
