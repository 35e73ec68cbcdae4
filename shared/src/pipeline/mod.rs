//! Export pipeline.
//!
//! Two pipelines share one [`AnalyticsClient`] (and with it one throttle):
//!
//! - traces: [`pagination`] → [`dedup`] → [`spans`]
//! - infrastructure metrics: [`catalog`] → [`batch`] → [`correlate`]
//!
//! [`Exporter`] runs either one for a lookback window and returns a summary.
//! Failures stay local to the smallest unit (page, type, chunk, trace) and
//! are reported through logs and the summary.

pub mod batch;
pub mod catalog;
pub mod correlate;
pub mod dedup;
pub mod pagination;
pub mod spans;

pub use batch::{chunk_metrics, RetrievalStats};
pub use catalog::{build_catalog, Catalog};
pub use correlate::{correlate_items, Correlated, Correlation};
pub use dedup::dedup_traces;
pub use pagination::{list_all_traces, PaginationError};
pub use spans::{export_spans, SpanStats};

use crate::client::{AnalyticsClient, ClientError};
use crate::config::{BatchConfig, ExportConfig, WindowDefaults};
use crate::sink::TelemetrySink;
use crate::throttle::Throttle;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Failure of a whole export run.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Entity types could not be listed, so there is nothing to retrieve.
    #[error("Entity type discovery failed: {0}")]
    Catalog(#[source] ClientError),

    /// The run was cancelled.
    #[error("Export cancelled")]
    Cancelled,
}

/// Result of a trace export run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceExportSummary {
    /// Trace references returned by the listing, duplicates included.
    pub traces_listed: usize,
    /// Distinct traces exported.
    pub unique_traces: usize,
    /// Spans handed to the sink.
    pub spans_emitted: usize,
    /// Traces whose spans could not be fetched.
    pub failed_traces: usize,
    /// Why the listing stopped early, if it did.
    pub pagination_error: Option<String>,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub finished_at: DateTime<Utc>,
}

impl TraceExportSummary {
    /// Run duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Result of an infrastructure metric export run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricExportSummary {
    /// Entity types discovered.
    pub entity_types: usize,
    /// Metric definitions discovered across all types.
    pub metrics_discovered: usize,
    /// Entity types whose metric lookup failed.
    pub catalog_failures: usize,
    /// Retrieval calls issued.
    pub chunks_requested: usize,
    /// Retrieval calls that failed.
    pub chunks_failed: usize,
    /// Retrieval calls rejected with a rate limit.
    pub chunks_rate_limited: usize,
    /// Samples handed to the sink.
    pub samples_emitted: usize,
    /// Series that matched no requested definition.
    pub correlation_failures: usize,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub finished_at: DateTime<Utc>,
}

impl MetricExportSummary {
    /// Run duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Runs export pipelines against the upstream API into a telemetry sink.
#[derive(Clone)]
pub struct Exporter {
    client: Arc<AnalyticsClient>,
    sink: Arc<dyn TelemetrySink>,
    batch: BatchConfig,
    windows: WindowDefaults,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("client", &self.client)
            .field("batch", &self.batch)
            .field("windows", &self.windows)
            .finish_non_exhaustive()
    }
}

impl Exporter {
    /// Creates an exporter with default batching and windows.
    #[must_use]
    pub fn new(client: Arc<AnalyticsClient>, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            client,
            sink,
            batch: BatchConfig::default(),
            windows: WindowDefaults::default(),
        }
    }

    /// Builds the throttle, client and exporter described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(
        config: &ExportConfig,
        sink: Arc<dyn TelemetrySink>,
    ) -> Result<Self, ClientError> {
        let throttle = Arc::new(Throttle::new(config.throttle.clone()));
        let client = Arc::new(AnalyticsClient::new(&config.upstream, throttle)?);
        Ok(Self::new(client, sink)
            .with_batch(config.batch.clone())
            .with_windows(config.windows))
    }

    /// Sets the batching limits.
    #[must_use]
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// Sets the default windows.
    #[must_use]
    pub fn with_windows(mut self, windows: WindowDefaults) -> Self {
        self.windows = windows;
        self
    }

    /// Client the exporter calls the upstream API with.
    #[must_use]
    pub fn client(&self) -> &Arc<AnalyticsClient> {
        &self.client
    }

    /// Default lookback windows.
    #[must_use]
    pub fn windows(&self) -> &WindowDefaults {
        &self.windows
    }

    /// Lists all traces of the window, deduplicates them and re-emits their
    /// spans.
    ///
    /// A listing that stops early still exports what was collected.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Cancelled`] if `cancel` fires.
    pub async fn export_traces(
        &self,
        window_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<TraceExportSummary, ExportError> {
        let started_at = Utc::now();
        info!(window_ms, "Starting trace export");

        let (listed, pagination_error) =
            match list_all_traces(&self.client, window_ms, cancel).await {
                Ok(listed) => (listed, None),
                Err(e) if e.source.is_cancelled() => return Err(ExportError::Cancelled),
                Err(e) => {
                    warn!(
                        partial = e.partial.len(),
                        error = %e.source,
                        "Trace listing incomplete; exporting partial result"
                    );
                    (e.partial, Some(e.source.to_string()))
                }
            };

        let traces_listed = listed.len();
        let unique = dedup_traces(listed);
        let unique_traces = unique.len();

        let stats = export_spans(&self.client, &self.sink, unique, cancel).await;
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        let summary = TraceExportSummary {
            traces_listed,
            unique_traces,
            spans_emitted: stats.spans_emitted,
            failed_traces: stats.failed_traces,
            pagination_error,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            traces_listed = summary.traces_listed,
            unique_traces = summary.unique_traces,
            spans_emitted = summary.spans_emitted,
            failed_traces = summary.failed_traces,
            duration_ms = summary.duration_ms(),
            "Trace export finished"
        );
        Ok(summary)
    }

    /// Discovers entity types and their metrics, retrieves every chunk and
    /// re-emits the correlated samples.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Catalog`] if entity types cannot be listed and
    /// [`ExportError::Cancelled`] if `cancel` fires.
    pub async fn export_infrastructure_metrics(
        &self,
        window_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<MetricExportSummary, ExportError> {
        let started_at = Utc::now();
        info!(window_ms, "Starting infrastructure metric export");

        let catalog = match build_catalog(&self.client, window_ms, cancel).await {
            Ok(catalog) => catalog,
            Err(e) if e.is_cancelled() => return Err(ExportError::Cancelled),
            Err(e) => return Err(ExportError::Catalog(e)),
        };
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        let entity_types = catalog.entity_types.len();
        let metrics_discovered = catalog.metric_count();
        let catalog_failures = catalog.failures;

        let stats = batch::retrieve_all(
            &self.client,
            &self.sink,
            catalog.entity_types,
            window_ms,
            &self.batch,
            cancel,
        )
        .await;
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        let summary = MetricExportSummary {
            entity_types,
            metrics_discovered,
            catalog_failures,
            chunks_requested: stats.chunks_requested,
            chunks_failed: stats.chunks_failed,
            chunks_rate_limited: stats.chunks_rate_limited,
            samples_emitted: stats.samples_emitted,
            correlation_failures: stats.correlation_failures,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            entity_types = summary.entity_types,
            metrics = summary.metrics_discovered,
            chunks = summary.chunks_requested,
            chunks_failed = summary.chunks_failed,
            samples_emitted = summary.samples_emitted,
            duration_ms = summary.duration_ms(),
            "Infrastructure metric export finished"
        );
        Ok(summary)
    }
}
