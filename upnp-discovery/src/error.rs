//! Error types for the discovery system.

/// Error type for discovery operations.
///
/// These errors surface only from constructors and from the internal steps of
/// description fetching. The registry and router never hand them to callers:
/// a device that cannot be resolved is logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// Socket creation, multicast membership or datagram I/O failed
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// The HTTP request for a device description failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The device answered the description request with a non-200 status
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// The announced location is not a usable URL
    #[error("Invalid location URL: {0}")]
    InvalidUrl(String),

    /// The description document is malformed or lacks a `root/device` element
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Convenience Result type alias for discovery operations.
///
/// Equivalent to `std::result::Result<T, DiscoveryError>`.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
