//! Upstream client errors.

use thiserror::Error;

/// Errors returned by [`AnalyticsClient`](super::AnalyticsClient) calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The upstream API rejected the call because the token's quota is spent.
    #[error("Rate limit reached calling {endpoint} (status {status})")]
    RateLimited {
        /// HTTP status code (429).
        status: u16,
        /// Endpoint path.
        endpoint: &'static str,
    },

    /// The upstream API answered with a non-success status.
    #[error("{endpoint} returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Endpoint path.
        endpoint: &'static str,
    },

    /// The request could not be sent or timed out.
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body does not match the expected schema.
    #[error("Malformed response from {endpoint}: {source}")]
    Decode {
        /// Endpoint path.
        endpoint: &'static str,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The response is well-formed but violates the API contract.
    #[error("Protocol error from {endpoint}: {reason}")]
    Protocol {
        /// Endpoint path.
        endpoint: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,
}

impl ClientError {
    /// Creates a protocol error.
    #[must_use]
    pub fn protocol(endpoint: &'static str, reason: impl Into<String>) -> Self {
        Self::Protocol {
            endpoint,
            reason: reason.into(),
        }
    }

    /// Returns true if the upstream quota was exhausted.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns true if the operation was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status of the failed call, if there was a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { status, .. } | Self::Status { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
