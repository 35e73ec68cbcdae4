//! Export pipeline configuration.
//!
//! Loaded from environment variables:
//! - `BASE_DOMAIN`: upstream API base URL (required)
//! - `API_TOKEN`: static API token (required)
//! - `REQUEST_TIMEOUT_MS`: per-call HTTP timeout (default: 30000)
//! - `THROTTLE_MAX_PER_INTERVAL`: calls per interval (default: 5000)
//! - `THROTTLE_INTERVAL_MS`: interval length (default: 3600000)
//! - `THROTTLE_EVENLY_SPACED`: spread calls over the interval (default: false)
//! - `METRICS_PER_REQUEST`: metrics per retrieval call (default: 10)
//! - `ENTITY_RETRIEVAL_SIZE`: entities per retrieval page (default: 200)
//! - `TRACE_WINDOW_MS`: default trace lookback (default: 20000)
//! - `METRICS_WINDOW_MS`: default metric lookback (default: 5000)

use super::ThrottleConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

/// Default lookback window for trace exports, in milliseconds.
pub const DEFAULT_TRACE_WINDOW_MS: u64 = 20_000;

/// Default lookback window for metric exports, in milliseconds.
pub const DEFAULT_METRICS_WINDOW_MS: u64 = 5_000;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("Invalid value '{value}' for {var}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },

    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Connection settings for the upstream analytics API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `https://tenant.example.com`.
    #[validate(url(message = "Base URL must be a valid URL"))]
    pub base_url: String,

    /// Token sent as `authorization: apiToken <token>`.
    #[serde(skip_serializing)]
    #[validate(length(min = 1, message = "API token cannot be empty"))]
    pub api_token: String,

    /// Timeout applied to every HTTP call.
    pub request_timeout: Duration,
}

impl UpstreamConfig {
    /// Creates upstream settings with the default timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Limits applied when building metric retrieval requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct BatchConfig {
    /// Maximum number of metrics requested per retrieval call.
    #[validate(range(min = 1, message = "Chunk size must be at least 1"))]
    pub metrics_per_request: usize,

    /// Entities returned per retrieval call.
    #[validate(range(min = 1, message = "Retrieval size must be at least 1"))]
    pub retrieval_size: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            metrics_per_request: 10,
            retrieval_size: 200,
        }
    }
}

/// Lookback windows used when a trigger does not supply one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDefaults {
    /// Trace lookback in milliseconds.
    pub traces_ms: u64,
    /// Metric lookback in milliseconds.
    pub metrics_ms: u64,
}

impl Default for WindowDefaults {
    fn default() -> Self {
        Self {
            traces_ms: DEFAULT_TRACE_WINDOW_MS,
            metrics_ms: DEFAULT_METRICS_WINDOW_MS,
        }
    }
}

/// Complete configuration of the export pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ExportConfig {
    /// Upstream connection settings.
    #[validate(nested)]
    pub upstream: UpstreamConfig,

    /// Outbound rate limit.
    #[validate(nested)]
    pub throttle: ThrottleConfig,

    /// Metric retrieval limits.
    #[validate(nested)]
    pub batch: BatchConfig,

    /// Default lookback windows.
    pub windows: WindowDefaults,
}

impl ExportConfig {
    /// Creates a configuration with defaults for everything but the upstream.
    #[must_use]
    pub fn new(upstream: UpstreamConfig) -> Self {
        Self {
            upstream,
            throttle: ThrottleConfig::default(),
            batch: BatchConfig::default(),
            windows: WindowDefaults::default(),
        }
    }

    /// Sets the throttle configuration.
    #[must_use]
    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }

    /// Sets the batch configuration.
    #[must_use]
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// Loads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `BASE_DOMAIN` or `API_TOKEN` is missing
    /// - a numeric or boolean variable cannot be parsed
    /// - the resulting configuration fails validation
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`ExportConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("BASE_DOMAIN").ok_or(ConfigError::Missing("BASE_DOMAIN"))?;
        let api_token = lookup("API_TOKEN").ok_or(ConfigError::Missing("API_TOKEN"))?;

        let upstream = UpstreamConfig::new(base_url.trim_end_matches('/'), api_token)
            .with_request_timeout(Duration::from_millis(parse_or(
                &lookup,
                "REQUEST_TIMEOUT_MS",
                30_000u64,
            )?));

        let throttle = ThrottleConfig::new(
            parse_or(&lookup, "THROTTLE_MAX_PER_INTERVAL", 5000u32)?,
            Duration::from_millis(parse_or(&lookup, "THROTTLE_INTERVAL_MS", 3_600_000u64)?),
        )
        .with_evenly_spaced(parse_or(&lookup, "THROTTLE_EVENLY_SPACED", false)?);

        let batch = BatchConfig {
            metrics_per_request: parse_or(&lookup, "METRICS_PER_REQUEST", 10usize)?,
            retrieval_size: parse_or(&lookup, "ENTITY_RETRIEVAL_SIZE", 200u32)?,
        };

        let windows = WindowDefaults {
            traces_ms: parse_or(&lookup, "TRACE_WINDOW_MS", DEFAULT_TRACE_WINDOW_MS)?,
            metrics_ms: parse_or(&lookup, "METRICS_WINDOW_MS", DEFAULT_METRICS_WINDOW_MS)?,
        };

        let config = Self {
            upstream,
            throttle,
            batch,
            windows,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_only_required_set() {
        let config = ExportConfig::from_lookup(lookup(&[
            ("BASE_DOMAIN", "https://tenant.example.com/"),
            ("API_TOKEN", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.upstream.base_url, "https://tenant.example.com");
        assert_eq!(config.upstream.request_timeout, Duration::from_secs(30));
        assert_eq!(config.throttle, ThrottleConfig::default());
        assert_eq!(config.batch.metrics_per_request, 10);
        assert_eq!(config.batch.retrieval_size, 200);
        assert_eq!(config.windows.traces_ms, 20_000);
        assert_eq!(config.windows.metrics_ms, 5_000);
    }

    #[test]
    fn test_missing_base_domain() {
        let result = ExportConfig::from_lookup(lookup(&[("API_TOKEN", "secret")]));
        assert!(matches!(result, Err(ConfigError::Missing("BASE_DOMAIN"))));
    }

    #[test]
    fn test_overrides() {
        let config = ExportConfig::from_lookup(lookup(&[
            ("BASE_DOMAIN", "https://tenant.example.com"),
            ("API_TOKEN", "secret"),
            ("THROTTLE_MAX_PER_INTERVAL", "5"),
            ("THROTTLE_INTERVAL_MS", "1000"),
            ("THROTTLE_EVENLY_SPACED", "true"),
            ("METRICS_PER_REQUEST", "4"),
        ]))
        .unwrap();

        assert_eq!(config.throttle.max_per_interval, 5);
        assert_eq!(config.throttle.interval, Duration::from_secs(1));
        assert!(config.throttle.evenly_spaced);
        assert_eq!(config.batch.metrics_per_request, 4);
    }

    #[test]
    fn test_unparsable_number() {
        let result = ExportConfig::from_lookup(lookup(&[
            ("BASE_DOMAIN", "https://tenant.example.com"),
            ("API_TOKEN", "secret"),
            ("METRICS_PER_REQUEST", "ten"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                var: "METRICS_PER_REQUEST",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_chunk_size_fails_validation() {
        let result = ExportConfig::from_lookup(lookup(&[
            ("BASE_DOMAIN", "https://tenant.example.com"),
            ("API_TOKEN", "secret"),
            ("METRICS_PER_REQUEST", "0"),
        ]));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_base_url_fails_validation() {
        let result = ExportConfig::from_lookup(lookup(&[
            ("BASE_DOMAIN", "not a url"),
            ("API_TOKEN", "secret"),
        ]));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
