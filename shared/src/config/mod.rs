//! Configuration module for the export pipeline.
//!
//! This module contains the upstream connection, rate limit, batching and
//! default window settings.

pub mod export;
pub mod throttle;

pub use export::{
    BatchConfig, ConfigError, ExportConfig, UpstreamConfig, WindowDefaults,
    DEFAULT_METRICS_WINDOW_MS, DEFAULT_TRACE_WINDOW_MS,
};
pub use throttle::ThrottleConfig;
