//! OpenTelemetry telemetry sink.
//!
//! Spans are started and immediately ended as roots carrying the original
//! span's fields as `instana.*` attributes; no parent linkage is rebuilt.
//! Metric samples are added to an up/down counter named after the series key,
//! so overlapping export windows accumulate.

use super::TelemetrySink;
use crate::models::{MetricSample, SpanRecord};
use opentelemetry::metrics::{Meter, UpDownCounter};
use opentelemetry::trace::{Span as _, Tracer};
use opentelemetry::{Context, KeyValue};
use std::collections::HashMap;
use std::sync::RwLock;

/// Attribute keys attached to every re-emitted span.
pub mod attributes {
    /// Trace identifier.
    pub const TRACE_ID: &str = "instana.traceId";
    /// Span identifier.
    pub const SPAN_ID: &str = "instana.spanId";
    /// Start timestamp (epoch ms).
    pub const TIMESTAMP: &str = "instana.timestamp";
    /// Parent span identifier.
    pub const PARENT_SPAN_ID: &str = "instana.parentSpanId";
    /// Foreign parent identifier.
    pub const FOREIGN_PARENT_ID: &str = "instana.foreignParentId";
    /// Duration (ms).
    pub const DURATION: &str = "instana.duration";
    /// Minimum self time (ms).
    pub const MIN_SELF_TIME: &str = "instana.minSelfTime";
    /// Network time (ms).
    pub const NETWORK_TIME: &str = "instana.networkTime";
    /// Call count.
    pub const CALL_COUNT: &str = "instana.callCount";
    /// Error count.
    pub const ERROR_COUNT: &str = "instana.errorCount";
    /// Entity type of a metric sample.
    pub const ENTITY_TYPE: &str = "entity.type";
    /// Entity label of a metric sample.
    pub const ENTITY_LABEL: &str = "entity.label";
}

/// Sink forwarding to an OpenTelemetry tracer and meter.
pub struct OtelSink<T> {
    tracer: T,
    meter: Meter,
    counters: RwLock<HashMap<String, UpDownCounter<f64>>>,
}

impl<T> std::fmt::Debug for OtelSink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtelSink")
            .field("counters", &self.counter_count())
            .finish_non_exhaustive()
    }
}

impl<T> OtelSink<T>
where
    T: Tracer,
{
    /// Creates a sink emitting through `tracer` and `meter`.
    #[must_use]
    pub fn new(tracer: T, meter: Meter) -> Self {
        Self {
            tracer,
            meter,
            counters: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> OtelSink<T> {
    /// Number of distinct counters created so far.
    #[must_use]
    pub fn counter_count(&self) -> usize {
        self.counters.read().map(|c| c.len()).unwrap_or_default()
    }

    fn counter(&self, sample: &MetricSample) -> UpDownCounter<f64> {
        if let Some(counter) = self
            .counters
            .read()
            .ok()
            .and_then(|c| c.get(&sample.metric_key).cloned())
        {
            return counter;
        }

        let build = || {
            let mut builder = self
                .meter
                .f64_up_down_counter(sample.metric_key.clone())
                .with_description(sample.description.clone());
            if !sample.format.is_empty() {
                builder = builder.with_unit(sample.format.clone());
            }
            builder.build()
        };

        match self.counters.write() {
            Ok(mut counters) => counters
                .entry(sample.metric_key.clone())
                .or_insert_with(build)
                .clone(),
            Err(_) => build(),
        }
    }
}

/// Builds the fixed attribute set of a re-emitted span.
///
/// Fields absent upstream are left out rather than sent as empty values.
#[must_use]
pub fn span_attributes(trace_id: &str, span: &SpanRecord) -> Vec<KeyValue> {
    let mut attrs = vec![
        KeyValue::new(attributes::TRACE_ID, trace_id.to_string()),
        KeyValue::new(attributes::SPAN_ID, span.id.clone()),
    ];

    let strings = [
        (attributes::PARENT_SPAN_ID, &span.parent_id),
        (attributes::FOREIGN_PARENT_ID, &span.foreign_parent_id),
    ];
    for (key, value) in strings {
        if let Some(value) = value {
            attrs.push(KeyValue::new(key, value.clone()));
        }
    }

    let numbers = [
        (attributes::TIMESTAMP, span.timestamp),
        (attributes::DURATION, span.duration),
        (attributes::MIN_SELF_TIME, span.min_self_time),
        (attributes::NETWORK_TIME, span.network_time),
        (attributes::CALL_COUNT, span.call_count),
        (attributes::ERROR_COUNT, span.error_count),
    ];
    for (key, value) in numbers {
        if let Some(value) = value {
            attrs.push(KeyValue::new(key, value));
        }
    }

    attrs
}

impl<T> TelemetrySink for OtelSink<T>
where
    T: Tracer + Send + Sync,
{
    fn emit_span(&self, trace_id: &str, span: &SpanRecord) {
        let mut emitted = self
            .tracer
            .span_builder(span.name.clone())
            .with_attributes(span_attributes(trace_id, span))
            .start_with_context(&self.tracer, &Context::new());
        emitted.end();
    }

    fn emit_metric_sample(&self, sample: &MetricSample) {
        self.counter(sample).add(
            sample.value,
            &[
                KeyValue::new(attributes::ENTITY_TYPE, sample.entity_plugin_name.clone()),
                KeyValue::new(attributes::ENTITY_LABEL, sample.entity_label.clone()),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricDefinition;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::Value;
    use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData};
    use opentelemetry_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};

    fn attribute(attrs: &[KeyValue], key: &str) -> Option<Value> {
        attrs
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.clone())
    }

    #[test]
    fn test_span_attributes_skip_missing_fields() {
        let span = SpanRecord::new("span-1", "GET /").with_duration(150);
        let attrs = span_attributes("trace-1", &span);

        assert_eq!(
            attribute(&attrs, attributes::TRACE_ID),
            Some(Value::from("trace-1"))
        );
        assert_eq!(attribute(&attrs, attributes::DURATION), Some(Value::I64(150)));
        assert_eq!(attribute(&attrs, attributes::PARENT_SPAN_ID), None);
        assert_eq!(attribute(&attrs, attributes::NETWORK_TIME), None);
    }

    #[test]
    fn test_emits_flat_span_with_attributes() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let meter_provider = SdkMeterProvider::builder().build();
        let sink = OtelSink::new(provider.tracer("test"), meter_provider.meter("test"));

        let span = SpanRecord::new("span-2", "SELECT users")
            .with_parent("span-1")
            .with_timestamp(1_690_000_000_000)
            .with_duration(80);
        sink.emit_span("trace-1", &span);

        let finished = exporter.get_finished_spans().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].name, "SELECT users");
        assert_eq!(
            attribute(&finished[0].attributes, attributes::PARENT_SPAN_ID),
            Some(Value::from("span-1"))
        );
        assert_eq!(
            attribute(&finished[0].attributes, attributes::TIMESTAMP),
            Some(Value::I64(1_690_000_000_000))
        );
    }

    #[test]
    fn test_counters_are_reused_per_metric_key() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter)
            .build();
        let meter_provider = SdkMeterProvider::builder().build();
        let sink = OtelSink::new(provider.tracer("test"), meter_provider.meter("test"));

        let definition = MetricDefinition::new("cpu.used", "CPU used").with_format("PERCENTAGE");
        for (label, value) in [("web-1", 10.0), ("web-2", 20.0)] {
            sink.emit_metric_sample(&MetricSample::correlated(
                "host",
                label,
                "cpu.used.value",
                (1, value),
                &definition,
            ));
        }
        sink.emit_metric_sample(&MetricSample::correlated(
            "host",
            "web-1",
            "mem.free.value",
            (1, 5.0),
            &MetricDefinition::new("mem.free", "Free memory"),
        ));

        assert_eq!(sink.counter_count(), 2);
    }

    #[test]
    fn test_counter_carries_sample_metadata_and_value() {
        let exporter = InMemoryMetricExporter::default();
        let meter_provider = SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(exporter.clone()).build())
            .build();
        let tracer_provider = SdkTracerProvider::builder().build();
        let sink = OtelSink::new(tracer_provider.tracer("test"), meter_provider.meter("test"));

        let definition = MetricDefinition::new("cpu.used", "CPU used")
            .with_description("CPU usage")
            .with_format("PERCENTAGE");
        for value in [10.0, 5.5] {
            sink.emit_metric_sample(&MetricSample::correlated(
                "host",
                "web-1",
                "cpu.used.value",
                (1, value),
                &definition,
            ));
        }
        meter_provider.force_flush().unwrap();

        let finished = exporter.get_finished_metrics().unwrap();
        let metric = finished
            .iter()
            .flat_map(|rm| rm.scope_metrics())
            .flat_map(|sm| sm.metrics())
            .find(|m| m.name() == "cpu.used.value")
            .expect("counter exported");
        assert_eq!(metric.description(), "CPU usage");
        assert_eq!(metric.unit(), "PERCENTAGE");

        let AggregatedMetrics::F64(MetricData::Sum(sum)) = metric.data() else {
            panic!("expected an f64 sum, got {:?}", metric.data());
        };
        assert!(!sum.is_monotonic());
        let points: Vec<_> = sum.data_points().collect();
        assert_eq!(points.len(), 1);
        assert!((points[0].value() - 15.5).abs() < f64::EPSILON);

        let attrs: Vec<KeyValue> = points[0].attributes().cloned().collect();
        assert_eq!(
            attribute(&attrs, attributes::ENTITY_TYPE),
            Some(Value::from("host"))
        );
        assert_eq!(
            attribute(&attrs, attributes::ENTITY_LABEL),
            Some(Value::from("web-1"))
        );
    }
}
