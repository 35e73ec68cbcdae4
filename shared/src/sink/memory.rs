//! In-memory telemetry sink.
//!
//! Records everything it receives. Used for tests and dry runs.

use super::TelemetrySink;
use crate::models::{MetricSample, SpanRecord};
use std::sync::{Arc, RwLock};

/// A span as handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedSpan {
    /// Trace the span belongs to.
    pub trace_id: String,
    /// The span.
    pub span: SpanRecord,
}

/// Sink that keeps emitted spans and samples in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    spans: Arc<RwLock<Vec<EmittedSpan>>>,
    samples: Arc<RwLock<Vec<MetricSample>>>,
}

impl InMemorySink {
    /// Creates a new empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all emitted spans, in emission order.
    #[must_use]
    pub fn spans(&self) -> Vec<EmittedSpan> {
        self.spans.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Returns a copy of all emitted samples, in emission order.
    #[must_use]
    pub fn samples(&self) -> Vec<MetricSample> {
        self.samples.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Number of emitted spans.
    #[must_use]
    pub fn span_count(&self) -> usize {
        self.spans.read().map(|s| s.len()).unwrap_or_default()
    }

    /// Number of emitted samples.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.samples.read().map(|s| s.len()).unwrap_or_default()
    }

    /// Discards everything recorded so far.
    pub fn clear(&self) {
        if let Ok(mut spans) = self.spans.write() {
            spans.clear();
        }
        if let Ok(mut samples) = self.samples.write() {
            samples.clear();
        }
    }
}

impl TelemetrySink for InMemorySink {
    fn emit_span(&self, trace_id: &str, span: &SpanRecord) {
        if let Ok(mut spans) = self.spans.write() {
            spans.push(EmittedSpan {
                trace_id: trace_id.to_string(),
                span: span.clone(),
            });
        }
    }

    fn emit_metric_sample(&self, sample: &MetricSample) {
        if let Ok(mut samples) = self.samples.write() {
            samples.push(sample.clone());
        }
    }
}
