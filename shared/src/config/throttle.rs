//! Rate limiter configuration.
//!
//! The upstream API enforces a per-token request quota; the throttle keeps
//! the bridge under it.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Quota applied to every outbound upstream call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ThrottleConfig {
    /// Maximum number of calls started within one interval.
    #[validate(range(min = 1, message = "Throttle quota must be at least 1"))]
    pub max_per_interval: u32,

    /// Length of the quota interval.
    pub interval: Duration,

    /// Spread calls evenly over the interval instead of allowing bursts.
    pub evenly_spaced: bool,
}

impl ThrottleConfig {
    /// Creates a new throttle configuration allowing bursts.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared::config::ThrottleConfig;
    /// use std::time::Duration;
    ///
    /// let config = ThrottleConfig::new(5, Duration::from_secs(1));
    /// assert!(!config.evenly_spaced);
    /// ```
    #[must_use]
    pub fn new(max_per_interval: u32, interval: Duration) -> Self {
        Self {
            max_per_interval,
            interval,
            evenly_spaced: false,
        }
    }

    /// Enables or disables even spacing.
    #[must_use]
    pub fn with_evenly_spaced(mut self, evenly_spaced: bool) -> Self {
        self.evenly_spaced = evenly_spaced;
        self
    }

    /// Minimum gap between two consecutive starts when evenly spaced.
    #[must_use]
    pub fn spacing(&self) -> Duration {
        self.interval / self.max_per_interval.max(1)
    }
}

impl Default for ThrottleConfig {
    /// 5000 calls per hour, bursts allowed.
    fn default() -> Self {
        Self::new(5000, Duration::from_secs(60 * 60))
    }
}
