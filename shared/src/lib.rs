//! APM Bridge Shared Library
//!
//! This crate contains the export pipeline that polls a monitoring platform's
//! analytics API and re-emits traces and infrastructure metrics as
//! OpenTelemetry spans and counters.
//!
//! # Modules
//!
//! - [`models`] - Metric catalog, trace listing and span data models
//! - [`config`] - Upstream, throttle, batching and window configuration
//! - [`throttle`] - Rolling-window rate limiter for upstream calls
//! - [`client`] - Upstream analytics API client and wire schemas
//! - [`pipeline`] - Pagination, deduplication, batching, correlation and export
//! - [`sink`] - Telemetry sinks receiving re-emitted spans and samples
//! - [`telemetry`] - OpenTelemetry SDK bootstrap
//!
//! # Example
//!
//! ```
//! use shared::models::{MetricDefinition, MetricSample};
//! use shared::pipeline::chunk_metrics;
//!
//! let definition = MetricDefinition::new("cpu.used", "CPU used").with_format("PERCENTAGE");
//! let sample = MetricSample::correlated("host", "web-1", "cpu.used.value", (1_690_000_000, 42.0), &definition);
//! assert_eq!(sample.format, "PERCENTAGE");
//!
//! let metrics = vec![definition; 23];
//! let sizes: Vec<_> = chunk_metrics(&metrics, 10).iter().map(|c| c.len()).collect();
//! assert_eq!(sizes, vec![10, 10, 3]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod sink;
pub mod telemetry;
pub mod throttle;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use tokio_util;
pub use validator;
