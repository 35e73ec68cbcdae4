//! OpenTelemetry SDK bootstrap for re-emitted telemetry.
//!
//! [`TelemetryGuard`] owns the tracer and meter providers the [`OtelSink`]
//! writes through. Dropping the guard flushes pending data and shuts the
//! providers down.

use crate::sink::OtelSink;
use opentelemetry::metrics::MeterProvider as _;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::error::OTelSdkError;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Instrumentation scope of the emitted spans and counters.
pub const INSTRUMENTATION_SCOPE: &str = "apm-bridge";

const DEFAULT_SERVICE_NAME: &str = "apm-bridge";
const DEFAULT_METRIC_EXPORT_INTERVAL_MS: u64 = 10_000;

/// Errors raised while setting up or tearing down telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// An environment variable has an unusable value.
    #[error("Invalid value '{value}' for {var}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },

    /// OTLP export was selected without an endpoint.
    #[error("TELEMETRY_EXPORTER=otlp requires OTEL_EXPORTER_OTLP_ENDPOINT")]
    MissingEndpoint,

    /// An exporter could not be built.
    #[error("Failed to build exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),

    /// A provider failed to flush or shut down.
    #[error("Telemetry provider error: {0}")]
    Provider(#[from] OTelSdkError),
}

/// Where re-emitted telemetry goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExporterKind {
    /// Pretty-printed to stdout.
    #[default]
    Stdout,
    /// OTLP over HTTP/protobuf.
    Otlp,
}

impl std::str::FromStr for ExporterKind {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" | "" => Ok(Self::Stdout),
            "otlp" => Ok(Self::Otlp),
            _ => Err(TelemetryError::Invalid {
                var: "TELEMETRY_EXPORTER",
                value: s.to_string(),
            }),
        }
    }
}

/// Telemetry SDK configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `service.name` resource attribute.
    pub service_name: String,
    /// Exporter to use.
    pub exporter: ExporterKind,
    /// OTLP collector base URL, e.g. `http://localhost:4318`.
    pub otlp_endpoint: Option<String>,
    /// How often the meter provider exports.
    pub metric_export_interval: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            exporter: ExporterKind::Stdout,
            otlp_endpoint: None,
            metric_export_interval: Duration::from_millis(DEFAULT_METRIC_EXPORT_INTERVAL_MS),
        }
    }
}

impl TelemetryConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed values or an OTLP exporter without endpoint.
    pub fn from_env() -> Result<Self, TelemetryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed values or an OTLP exporter without endpoint.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TelemetryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let exporter = non_empty("TELEMETRY_EXPORTER")
            .map(|v| v.parse::<ExporterKind>())
            .transpose()?
            .unwrap_or_default();

        let otlp_endpoint = non_empty("OTEL_EXPORTER_OTLP_ENDPOINT");
        if exporter == ExporterKind::Otlp && otlp_endpoint.is_none() {
            return Err(TelemetryError::MissingEndpoint);
        }

        let interval_ms = match non_empty("METRIC_EXPORT_INTERVAL_MS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| TelemetryError::Invalid {
                var: "METRIC_EXPORT_INTERVAL_MS",
                value: raw,
            })?,
            None => DEFAULT_METRIC_EXPORT_INTERVAL_MS,
        };

        Ok(Self {
            service_name: non_empty("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            exporter,
            otlp_endpoint,
            metric_export_interval: Duration::from_millis(interval_ms),
        })
    }

    fn signal_endpoint(&self, path: &str) -> Option<String> {
        self.otlp_endpoint
            .as_deref()
            .map(|base| format!("{}{path}", base.trim_end_matches('/')))
    }
}

/// Owns the SDK providers backing an [`OtelSink`].
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl std::fmt::Debug for TelemetryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryGuard")
            .field("active", &self.tracer_provider.is_some())
            .finish()
    }
}

impl TelemetryGuard {
    /// Builds the tracer and meter providers.
    ///
    /// Exporters run on their own background threads.
    ///
    /// # Errors
    ///
    /// Returns an error if an exporter cannot be built.
    pub fn init(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let resource = Resource::builder()
            .with_service_name(config.service_name.clone())
            .build();

        let (tracer_provider, meter_provider) = match config.exporter {
            ExporterKind::Stdout => {
                let tracer_provider = SdkTracerProvider::builder()
                    .with_batch_exporter(opentelemetry_stdout::SpanExporter::default())
                    .with_resource(resource.clone())
                    .build();
                let reader = PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
                    .with_interval(config.metric_export_interval)
                    .build();
                let meter_provider = SdkMeterProvider::builder()
                    .with_reader(reader)
                    .with_resource(resource)
                    .build();
                (tracer_provider, meter_provider)
            }
            ExporterKind::Otlp => {
                let traces = config
                    .signal_endpoint("/v1/traces")
                    .ok_or(TelemetryError::MissingEndpoint)?;
                let metrics = config
                    .signal_endpoint("/v1/metrics")
                    .ok_or(TelemetryError::MissingEndpoint)?;

                let span_exporter = opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .with_endpoint(traces)
                    .with_protocol(opentelemetry_otlp::Protocol::HttpBinary)
                    .build()?;
                let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
                    .with_http()
                    .with_endpoint(metrics)
                    .with_protocol(opentelemetry_otlp::Protocol::HttpBinary)
                    .build()?;

                let tracer_provider = SdkTracerProvider::builder()
                    .with_batch_exporter(span_exporter)
                    .with_resource(resource.clone())
                    .build();
                let reader = PeriodicReader::builder(metric_exporter)
                    .with_interval(config.metric_export_interval)
                    .build();
                let meter_provider = SdkMeterProvider::builder()
                    .with_reader(reader)
                    .with_resource(resource)
                    .build();
                (tracer_provider, meter_provider)
            }
        };

        info!(
            service_name = %config.service_name,
            exporter = ?config.exporter,
            "Telemetry providers initialized"
        );

        Ok(Self {
            tracer_provider: Some(tracer_provider),
            meter_provider: Some(meter_provider),
        })
    }

    /// Creates a sink writing through this guard's providers.
    ///
    /// Returns `None` once the guard has been shut down.
    #[must_use]
    pub fn sink(&self) -> Option<OtelSink<SdkTracer>> {
        let tracer = self.tracer_provider.as_ref()?.tracer(INSTRUMENTATION_SCOPE);
        let meter = self.meter_provider.as_ref()?.meter(INSTRUMENTATION_SCOPE);
        Some(OtelSink::new(tracer, meter))
    }

    /// Flushes both providers, logging failures.
    pub fn flush(&self) {
        if let Some(provider) = &self.tracer_provider {
            if let Err(e) = provider.force_flush() {
                warn!(error = %e, "Failed to flush tracer provider");
            }
        }
        if let Some(provider) = &self.meter_provider {
            if let Err(e) = provider.force_flush() {
                warn!(error = %e, "Failed to flush meter provider");
            }
        }
    }

    /// Flushes and shuts down both providers.
    ///
    /// # Errors
    ///
    /// Returns the first flush or shutdown error.
    pub fn shutdown(mut self) -> Result<(), TelemetryError> {
        if let Some(provider) = self.tracer_provider.take() {
            provider.force_flush()?;
            provider.shutdown()?;
        }
        if let Some(provider) = self.meter_provider.take() {
            provider.force_flush()?;
            provider.shutdown()?;
        }
        Ok(())
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            let _ = provider.force_flush();
            if let Err(e) = provider.shutdown() {
                warn!(error = %e, "Failed to shut down tracer provider");
            }
        }
        if let Some(provider) = self.meter_provider.take() {
            let _ = provider.force_flush();
            if let Err(e) = provider.shutdown() {
                warn!(error = %e, "Failed to shut down meter provider");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TelemetryConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, TelemetryConfig::default());
        assert_eq!(config.service_name, "apm-bridge");
        assert_eq!(config.metric_export_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_otlp_requires_endpoint() {
        let err = TelemetryConfig::from_lookup(lookup(&[("TELEMETRY_EXPORTER", "otlp")]))
            .unwrap_err();
        assert!(matches!(err, TelemetryError::MissingEndpoint));
    }

    #[test]
    fn test_otlp_signal_endpoints() {
        let config = TelemetryConfig::from_lookup(lookup(&[
            ("TELEMETRY_EXPORTER", "OTLP"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4318/"),
            ("OTEL_SERVICE_NAME", "bridge-test"),
        ]))
        .unwrap();

        assert_eq!(config.exporter, ExporterKind::Otlp);
        assert_eq!(config.service_name, "bridge-test");
        assert_eq!(
            config.signal_endpoint("/v1/traces").as_deref(),
            Some("http://collector:4318/v1/traces")
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            TelemetryConfig::from_lookup(lookup(&[("TELEMETRY_EXPORTER", "zipkin")])),
            Err(TelemetryError::Invalid { .. })
        ));
        assert!(matches!(
            TelemetryConfig::from_lookup(lookup(&[("METRIC_EXPORT_INTERVAL_MS", "soon")])),
            Err(TelemetryError::Invalid { .. })
        ));
    }

    #[test]
    fn test_guard_hands_out_sink_until_shutdown() {
        let guard = TelemetryGuard::init(&TelemetryConfig::default()).unwrap();
        assert!(guard.sink().is_some());
        guard.shutdown().unwrap();
    }
}
