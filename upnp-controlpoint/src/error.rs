//! Error types for the control point.

use callback_server::CallbackServerError;
use upnp_discovery::DiscoveryError;

/// Errors raised while starting or stopping a [`ControlPoint`](crate::ControlPoint).
///
/// Once running, the control point does not surface errors: discovery and
/// notification failures are logged per device.
#[derive(Debug, thiserror::Error)]
pub enum ControlPointError {
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Callback server error: {0}")]
    CallbackServer(#[from] CallbackServerError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, ControlPointError>;
