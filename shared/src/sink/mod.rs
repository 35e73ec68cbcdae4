//! Telemetry sinks.
//!
//! The export pipeline hands every re-emitted span and metric sample to a
//! [`TelemetrySink`]. The sink is constructed once at startup and injected
//! into the exporter; the pipeline never reaches for global providers.

pub mod memory;
pub mod otel;

pub use memory::{EmittedSpan, InMemorySink};
pub use otel::OtelSink;

use crate::models::{MetricSample, SpanRecord};

/// Destination of re-emitted telemetry.
///
/// Implementations must be thread-safe (Send + Sync); spans of different
/// traces are emitted concurrently.
pub trait TelemetrySink: Send + Sync {
    /// Emits one span of the trace `trace_id`.
    fn emit_span(&self, trace_id: &str, span: &SpanRecord);

    /// Emits one correlated metric sample.
    fn emit_metric_sample(&self, sample: &MetricSample);
}
