//! Application state.

use std::sync::Arc;

use crate::config::MarkerServerConfig;
use crate::obs::RecorderClient;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<MarkerServerConfig>,
    pub recorder: Arc<dyn RecorderClient>,
}

impl AppState {
    pub fn new(config: MarkerServerConfig, recorder: Arc<dyn RecorderClient>) -> Self {
        Self {
            config: Arc::new(config),
            recorder,
        }
    }
}
