//! OBS marker server.
//!
//! This crate provides:
//! - An OBS WebSocket v5 client with automatic reconnect
//! - Resolution of the live recording time into marker seconds
//! - The HTTP control surface (`POST /marker`, `GET /status`, `GET /health`)
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod markers;
pub mod metrics;
pub mod middleware;
pub mod obs;
pub mod routes;
pub mod state;

pub use config::{MarkerServerConfig, ReconnectPolicy};
pub use error::{ApiError, ApiResult, ObsError, ObsResult};
pub use markers::append_marker;
pub use obs::{resolve_elapsed_seconds, ObsConnection, ObsSettings, RecordStatus, RecorderClient};
pub use routes::create_router;
pub use state::AppState;
