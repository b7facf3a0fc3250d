//! Prometheus metrics for the marker server.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "obsclip_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "obsclip_http_request_duration_seconds";

    // Marker capture
    pub const MARKER_REQUESTS_TOTAL: &str = "obsclip_marker_requests_total";

    // Recorder connection
    pub const OBS_CONNECTED: &str = "obsclip_obs_connected";
    pub const OBS_CONNECTIONS_TOTAL: &str = "obsclip_obs_connections_total";
    pub const OBS_REQUESTS_TOTAL: &str = "obsclip_obs_requests_total";
    pub const OBS_REQUEST_DURATION_SECONDS: &str = "obsclip_obs_request_duration_seconds";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", route_label(path).to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a `POST /marker` outcome.
pub fn record_marker_request(outcome: &'static str) {
    counter!(names::MARKER_REQUESTS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record the connection going up or down.
pub fn record_obs_connected(connected: bool) {
    gauge!(names::OBS_CONNECTED).set(if connected { 1.0 } else { 0.0 });
    if connected {
        counter!(names::OBS_CONNECTIONS_TOTAL).increment(1);
    }
}

/// Record one request round-trip to OBS.
pub fn record_obs_request(request_type: &'static str, ok: bool, duration_secs: f64) {
    let labels = [
        ("request_type", request_type.to_string()),
        ("result", if ok { "ok" } else { "error" }.to_string()),
    ];
    counter!(names::OBS_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::OBS_REQUEST_DURATION_SECONDS, "request_type" => request_type)
        .record(duration_secs);
}

/// Known routes keep their path; everything else collapses to one label.
fn route_label(path: &str) -> &'static str {
    match path {
        "/marker" => "/marker",
        "/status" => "/status",
        "/health" => "/health",
        "/metrics" => "/metrics",
        _ => "other",
    }
}
