//! Marker server binary.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use obsclip_api::{
    create_router, metrics, AppState, MarkerServerConfig, ObsConnection, ObsSettings,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    let _ = rustls::crypto::ring::default_provider().install_default();

    init_tracing();

    info!("Starting obs-marker-server");

    let config = MarkerServerConfig::from_env();
    info!(
        obs = %format!("{}:{}", config.obs_host, config.obs_port),
        http = %config.bind_addr(),
        marker_file = %config.marker_file.display(),
        "Marker server config"
    );

    let metrics_handle = if config.metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "Prometheus recorder unavailable, /metrics disabled");
                None
            }
        }
    } else {
        None
    };

    let settings = ObsSettings::from_config(&config).inspect_err(|e| {
        error!(error = %e, "Invalid OBS connection settings");
    })?;
    let connection = ObsConnection::new(settings);
    let cancel = CancellationToken::new();
    let obs_task = connection.spawn(cancel.clone());

    let addr = config.bind_addr();
    let state = AppState::new(config, Arc::new(connection));
    let app = create_router(state, metrics_handle);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);
    info!("Marker endpoint: POST http://{}/marker", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .context("HTTP server failed")?;

    cancel.cancel();
    if let Err(e) = obs_task.await {
        warn!(error = %e, "OBS connection task ended abnormally");
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("obsclip=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                    cancel.cancelled().await;
                }
            }
        }
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
}
