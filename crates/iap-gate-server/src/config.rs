//! Gateway configuration types.

use std::time::Duration;

/// Configuration for the gateway service.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    pub listen_addr: String,

    /// Directory holding the `RocksDB` user store.
    pub data_dir: String,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_data_dir() -> String {
        "/data/iap-gate".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    /// Load the configuration from `LISTEN_ADDR`, `DATA_DIR` and
    /// `REQUEST_TIMEOUT_SECONDS`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load the configuration from an arbitrary variable source.
    ///
    /// An unparsable timeout is ignored with a warning.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(dir) = lookup("DATA_DIR") {
            config.data_dir = dir;
        }
        if let Some(value) = lookup("REQUEST_TIMEOUT_SECONDS") {
            match value.trim().parse() {
                Ok(seconds) => config.request_timeout_seconds = seconds,
                Err(e) => tracing::warn!(
                    value = %value,
                    error = %e,
                    "Ignoring invalid REQUEST_TIMEOUT_SECONDS"
                ),
            }
        }

        config
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            data_dir: Self::default_data_dir(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}
