//! APM Bridge API Server
//!
//! This crate provides the HTTP trigger for the APM Bridge export pipeline.
//! Each trigger starts one export run against the upstream analytics API in
//! the background; the run re-emits what it finds as OpenTelemetry spans and
//! counters.
//!
//! # Routes
//!
//! - `GET /traces?startTime=<ms>` - export traces of the last `startTime` ms
//! - `GET /infrastructure/metrics?startTime=<ms>` - export infrastructure metrics
//! - `GET /health` - health check
//!
//! # Example
//!
//! ```no_run
//! use api::run_server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_server().await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
mod routes;
mod state;

pub use config::Config;
pub use routes::{ExportParams, PROCESSING};
pub use state::AppState;

use anyhow::{Context, Result};
use axum::Router;
use shared::config::ExportConfig;
use shared::pipeline::Exporter;
use shared::telemetry::{TelemetryConfig, TelemetryGuard};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Runs the APM Bridge API server.
///
/// Loads server, export and telemetry configuration from environment
/// variables, starts listening, and shuts down gracefully on SIGTERM/SIGINT.
/// In-flight exports are cancelled and awaited before pending telemetry is
/// flushed.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - The telemetry exporters cannot be built
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server() -> Result<()> {
    let config = Config::from_env()?;
    let export_config = ExportConfig::from_env()?;
    let telemetry = TelemetryGuard::init(&TelemetryConfig::from_env()?)?;

    let sink = telemetry
        .sink()
        .context("Telemetry providers are not available")?;
    let exporter = Exporter::from_config(&export_config, Arc::new(sink))?;
    let state = AppState::new(exporter, CancellationToken::new());

    run_server_with_config(config, state).await?;

    telemetry.shutdown()?;
    Ok(())
}

/// Runs the APM Bridge API server with the provided configuration and state.
///
/// This is useful for testing or when you want to provide configuration programmatically.
/// The server also stops when the state's shutdown token is cancelled.
///
/// # Errors
///
/// Returns an error if:
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server_with_config(config: Config, state: AppState) -> Result<()> {
    let addr = config.socket_addr()?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "APM Bridge API server starting"
    );

    let shutdown = state.shutdown().clone();
    let app = create_router(state.clone());
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    tracing::info!(
        pending = state.tasks().len(),
        "Waiting for running exports to stop"
    );
    state.drain().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Creates the main application router with all routes and middleware.
///
/// This function is public to allow testing the router without starting a full server.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::export_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Waits for a shutdown signal (SIGTERM, SIGINT or cancellation of `token`)
/// and cancels `token` so running exports stop.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
        () = token.cancelled() => {
            tracing::info!("Shutdown requested, starting graceful shutdown");
        }
    }

    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use shared::client::AnalyticsClient;
    use shared::config::{ThrottleConfig, UpstreamConfig};
    use shared::sink::InMemorySink;
    use shared::throttle::Throttle;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let throttle = Arc::new(Throttle::new(ThrottleConfig::default()));
        let client =
            AnalyticsClient::new(&UpstreamConfig::new("http://127.0.0.1:9", "token"), throttle)
                .unwrap();
        let exporter = Exporter::new(Arc::new(client), Arc::new(InMemorySink::new()));
        AppState::new(exporter, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_health_endpoint_returns_json() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok());
        assert!(content_type.is_some_and(|ct| ct.contains("application/json")));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/logs")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_server_stops_when_token_cancelled() {
        let state = test_state();
        let token = state.shutdown().clone();
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
        };

        let server = tokio::spawn(run_server_with_config(config, state));
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
