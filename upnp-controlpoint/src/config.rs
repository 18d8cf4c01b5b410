//! Control point configuration.

use std::time::Duration;

use callback_server::CallbackServerConfig;
use upnp_discovery::DiscoveryConfig;

use crate::error::{ControlPointError, Result};

/// Configuration for [`ControlPoint`](crate::ControlPoint).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPointConfig {
    /// Event callback server settings
    pub callback: CallbackServerConfig,

    /// Discovery settings
    pub discovery: DiscoveryConfig,

    /// How often to scrub stale devices; `None` disables the background scrub
    /// Default: 60 seconds
    pub scrub_interval: Option<Duration>,

    /// Devices not seen for longer than this are forgotten by the background scrub
    /// Default: 1800 seconds, the usual SSDP `max-age`
    pub max_age: Duration,

    /// Send a search with the default target as soon as the control point starts
    /// Default: true
    pub search_on_start: bool,
}

impl Default for ControlPointConfig {
    fn default() -> Self {
        Self {
            callback: CallbackServerConfig::default(),
            discovery: DiscoveryConfig::default(),
            scrub_interval: Some(Duration::from_secs(60)),
            max_age: Duration::from_secs(1800),
            search_on_start: true,
        }
    }
}

impl ControlPointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(mut self, callback: CallbackServerConfig) -> Self {
        self.callback = callback;
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_scrub_interval(mut self, interval: Option<Duration>) -> Self {
        self.scrub_interval = interval;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_search_on_start(mut self, search: bool) -> Self {
        self.search_on_start = search;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.discovery.validate()?;

        if self.scrub_interval == Some(Duration::ZERO) {
            return Err(ControlPointError::Configuration(
                "Scrub interval must be greater than 0".to_string(),
            ));
        }

        if self.max_age.is_zero() {
            return Err(ControlPointError::Configuration(
                "Max age must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_config() {
        let config = ControlPointConfig::default();
        assert_eq!(config.callback.port, 6767);
        assert_eq!(config.discovery.search_target, "upnp:rootdevice");
        assert_eq!(config.scrub_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.max_age, Duration::from_secs(1800));
        assert!(config.search_on_start);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case::zero_scrub_interval(ControlPointConfig::new().with_scrub_interval(Some(Duration::ZERO)), false)]
    #[case::zero_max_age(ControlPointConfig::new().with_max_age(Duration::ZERO), false)]
    #[case::empty_search_target(
        ControlPointConfig::new().with_discovery(DiscoveryConfig::new().with_search_target("")),
        false
    )]
    #[case::scrubbing_disabled(ControlPointConfig::new().with_scrub_interval(None), true)]
    #[case::short_intervals(
        ControlPointConfig::new()
            .with_scrub_interval(Some(Duration::from_millis(50)))
            .with_max_age(Duration::from_millis(200)),
        true
    )]
    fn test_config_validation(#[case] config: ControlPointConfig, #[case] valid: bool) {
        assert_eq!(config.validate().is_ok(), valid);
    }
}
