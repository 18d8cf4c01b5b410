//! Configuration for discovery.

use std::time::Duration;

use crate::error::{DiscoveryError, Result};
use crate::transport::ROOT_DEVICE_TARGET;

/// Configuration for [`DiscoveryRouter`](crate::DiscoveryRouter) and [`HttpFetcher`](crate::HttpFetcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Search target used when `search` is called without one
    /// Default: "upnp:rootdevice"
    pub search_target: String,

    /// Upper bound on a single description fetch
    /// Default: none (a hung device stalls only its own resolution)
    pub fetch_timeout: Option<Duration>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_target: ROOT_DEVICE_TARGET.to_string(),
            fetch_timeout: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_target(mut self, target: impl Into<String>) -> Self {
        self.search_target = target.into();
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.search_target.trim().is_empty() {
            return Err(DiscoveryError::Configuration(
                "Search target must not be empty".to_string(),
            ));
        }

        if self.fetch_timeout == Some(Duration::ZERO) {
            return Err(DiscoveryError::Configuration(
                "Fetch timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
