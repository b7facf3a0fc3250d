//! Marker server routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{create_marker, health, not_found, status};
use crate::middleware::{cors_layer, request_logging};
use crate::state::AppState;

/// No route takes a meaningful body.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Create the marker server router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .route("/marker", post(create_marker))
        .route("/status", get(status))
        .route("/health", get(health))
        .merge(metrics_routes)
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer())
        .with_state(state)
}
