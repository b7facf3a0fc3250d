//! Marker server configuration.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ObsError;

/// Reconnect schedule for the recorder connection.
///
/// The connection is retried indefinitely on a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
        }
    }
}

/// Marker server configuration.
#[derive(Debug, Clone)]
pub struct MarkerServerConfig {
    /// OBS WebSocket host
    pub obs_host: String,
    /// OBS WebSocket port
    pub obs_port: u16,
    /// OBS WebSocket password; `None` when authentication is disabled
    pub obs_password: Option<String>,
    /// Per-request timeout against OBS
    pub obs_request_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// HTTP listener host
    pub http_host: String,
    /// HTTP listener port
    pub http_port: u16,
    /// Pending-marker side channel shared with the ingest watcher
    pub marker_file: PathBuf,
    pub metrics_enabled: bool,
}

impl Default for MarkerServerConfig {
    fn default() -> Self {
        Self {
            obs_host: "127.0.0.1".to_string(),
            obs_port: 4455,
            obs_password: None,
            obs_request_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
            http_host: "0.0.0.0".to_string(),
            http_port: 3000,
            marker_file: PathBuf::from("markers.txt"),
            metrics_enabled: true,
        }
    }
}

impl MarkerServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            obs_host: std::env::var("OBS_WS_HOST").unwrap_or(defaults.obs_host),
            obs_port: std::env::var("OBS_WS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.obs_port),
            obs_password: std::env::var("OBS_WS_PASSWORD")
                .ok()
                .filter(|s| !s.is_empty()),
            obs_request_timeout: std::env::var("OBS_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.obs_request_timeout),
            reconnect: ReconnectPolicy {
                delay: std::env::var("OBS_RECONNECT_DELAY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.reconnect.delay),
            },
            http_host: std::env::var("HTTP_HOST").unwrap_or(defaults.http_host),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.http_port),
            marker_file: std::env::var("MARKER_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.marker_file),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
        }
    }

    /// WebSocket URL of the recorder.
    pub fn obs_url(&self) -> Result<Url, ObsError> {
        let raw = format!("ws://{}:{}", self.obs_host, self.obs_port);
        Url::parse(&raw).map_err(|e| ObsError::connect(format!("invalid OBS address {}: {}", raw, e)))
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}
