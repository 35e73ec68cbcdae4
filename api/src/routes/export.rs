//! Export trigger endpoints.
//!
//! Each request starts one export run in the background and is answered
//! with `processing` right away; the outcome only shows up in the logs and
//! in the re-emitted telemetry.

use crate::state::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::{info, warn};

/// Body returned by both triggers.
pub const PROCESSING: &str = "processing";

/// Query parameters of the export triggers.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportParams {
    /// Lookback window in milliseconds, as sent.
    pub start_time: Option<String>,
}

impl ExportParams {
    /// Returns the requested window, or `default` when it is absent, zero,
    /// or does not start with a digit.
    ///
    /// Only the leading digits are read, so `1500ms` and `1500.7` both
    /// request 1500 ms.
    #[must_use]
    pub fn window_ms(&self, default: u64) -> u64 {
        self.start_time
            .as_deref()
            .and_then(|raw| {
                let raw = raw.trim_start();
                let digits = raw
                    .find(|c: char| !c.is_ascii_digit())
                    .map_or(raw, |end| &raw[..end]);
                digits.parse::<u64>().ok()
            })
            .filter(|&window| window > 0)
            .unwrap_or(default)
    }
}

/// Creates the export trigger routes.
pub fn export_routes() -> Router<AppState> {
    Router::new()
        .route("/traces", get(trigger_traces))
        .route("/infrastructure/metrics", get(trigger_metrics))
}

async fn trigger_traces(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> &'static str {
    let window_ms = params.window_ms(state.windows().traces_ms);
    let exporter = state.exporter();
    let cancel = state.shutdown().child_token();

    info!(window_ms, "Trace export requested");
    state.tasks().spawn(async move {
        if let Err(e) = exporter.export_traces(window_ms, &cancel).await {
            warn!(error = %e, "Trace export did not complete");
        }
    });

    PROCESSING
}

async fn trigger_metrics(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> &'static str {
    let window_ms = params.window_ms(state.windows().metrics_ms);
    let exporter = state.exporter();
    let cancel = state.shutdown().child_token();

    info!(window_ms, "Infrastructure metric export requested");
    state.tasks().spawn(async move {
        if let Err(e) = exporter.export_infrastructure_metrics(window_ms, &cancel).await {
            warn!(error = %e, "Infrastructure metric export did not complete");
        }
    });

    PROCESSING
}
