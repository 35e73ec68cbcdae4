//! Health check endpoint.
//!
//! Reports liveness together with the upstream the bridge exports from and
//! the quota its calls are paced by.

use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status (always "healthy" if reachable).
    pub status: &'static str,
    /// Service name.
    pub service: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Upstream analytics API.
    pub upstream: UpstreamStatus,
}

/// Upstream target and call quota.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamStatus {
    /// Base URL calls are sent to.
    pub base_url: String,
    /// Calls allowed per interval.
    pub max_requests_per_interval: u32,
    /// Quota interval in milliseconds.
    pub interval_ms: u64,
    /// Whether calls are spread over the interval.
    pub evenly_spaced: bool,
}

/// Creates the health check routes.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let exporter = state.exporter();
    let client = exporter.client();
    let quota = client.throttle().config();

    Json(HealthResponse {
        status: "healthy",
        service: "apm-bridge-api",
        version: env!("CARGO_PKG_VERSION"),
        upstream: UpstreamStatus {
            base_url: client.base_url().to_string(),
            max_requests_per_interval: quota.max_per_interval,
            interval_ms: u64::try_from(quota.interval.as_millis()).unwrap_or(u64::MAX),
            evenly_spaced: quota.evenly_spaced,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use shared::client::AnalyticsClient;
    use shared::config::{ThrottleConfig, UpstreamConfig};
    use shared::pipeline::Exporter;
    use shared::sink::InMemorySink;
    use shared::throttle::Throttle;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn app() -> Router {
        let throttle = Arc::new(Throttle::new(
            ThrottleConfig::new(5000, Duration::from_secs(3600)).with_evenly_spaced(true),
        ));
        let client = AnalyticsClient::new(
            &UpstreamConfig::new("https://tenant.example.com/", "token"),
            throttle,
        )
        .unwrap();
        let exporter = Exporter::new(Arc::new(client), Arc::new(InMemorySink::new()));
        health_routes().with_state(AppState::new(exporter, CancellationToken::new()))
    }

    async fn health() -> (StatusCode, serde_json::Value) {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_check_body() {
        let (status, health) = health().await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["service"], "apm-bridge-api");
        assert!(health["version"].is_string());
    }

    #[tokio::test]
    async fn test_health_reports_upstream_quota() {
        let (_status, health) = health().await;

        assert_eq!(health["upstream"]["baseUrl"], "https://tenant.example.com");
        assert_eq!(health["upstream"]["maxRequestsPerInterval"], 5000);
        assert_eq!(health["upstream"]["intervalMs"], 3_600_000);
        assert_eq!(health["upstream"]["evenlySpaced"], true);
    }
}
