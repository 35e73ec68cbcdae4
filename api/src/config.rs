//! Server configuration module.
//!
//! Handles loading configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::net::SocketAddr;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// Server configuration.
///
/// Configuration values can be set via environment variables:
/// - `APM_BRIDGE_HOST`: The host address to bind to (default: "0.0.0.0")
/// - `APM_BRIDGE_PORT`: The port to listen on; falls back to `PORT`, then 8080
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The host address to bind to.
    pub host: String,
    /// The port to listen on.
    pub port: u16,
}

impl Config {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the port variable is set but is not a valid port number.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a new configuration from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the port variable is set but is not a valid port number.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("APM_BRIDGE_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = lookup("APM_BRIDGE_PORT")
            .or_else(|| lookup("PORT"))
            .map(|p| {
                p.trim()
                    .parse::<u16>()
                    .with_context(|| format!("Invalid port '{p}'"))
            })
            .transpose()?
            .unwrap_or(DEFAULT_PORT);

        Ok(Self { host, port })
    }

    /// Returns the socket address for binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the host and port do not form a valid socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid socket address {}:{}", self.host, self.port))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Config::from_lookup(lookup(&[])).unwrap(), Config::default());
    }

    #[test]
    fn test_port_fallback_order() {
        let config = Config::from_lookup(lookup(&[("PORT", "9000")])).unwrap();
        assert_eq!(config.port, 9000);

        let config =
            Config::from_lookup(lookup(&[("PORT", "9000"), ("APM_BRIDGE_PORT", "9100")])).unwrap();
        assert_eq!(config.port, 9100);
    }

    #[test]
    fn test_invalid_port() {
        assert!(Config::from_lookup(lookup(&[("APM_BRIDGE_PORT", "http")])).is_err());
    }

    #[test]
    fn test_socket_addr() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:3000");

        let config = Config {
            host: "not a host".to_string(),
            port: 3000,
        };
        assert!(config.socket_addr().is_err());
    }
}
