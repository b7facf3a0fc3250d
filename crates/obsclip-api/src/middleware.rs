//! HTTP middleware.

use std::time::Instant;

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::middleware::Next;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use crate::metrics;

/// CORS for hotkey tools and browser overlays: any origin, GET/POST/OPTIONS.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Request logging middleware.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let duration = start.elapsed();
    metrics::record_http_request(
        method.as_str(),
        uri.path(),
        status.as_u16(),
        duration.as_secs_f64(),
    );

    // Polling endpoints stay at debug
    if matches!(uri.path(), "/health" | "/status" | "/metrics") {
        debug!(method = %method, uri = %uri, status = %status, "Request completed");
    } else {
        info!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}
