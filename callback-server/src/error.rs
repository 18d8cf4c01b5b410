//! Error types for the callback server.

use std::net::SocketAddr;

/// Errors raised while starting or stopping the callback server.
///
/// Request handling itself never fails outward: malformed or unroutable
/// notifications are logged and the connection is closed without a response.
#[derive(Debug, thiserror::Error)]
pub enum CallbackServerError {
    /// The listening socket could not be bound
    #[error("Failed to bind callback server to {addr}: {source}")]
    Bind {
        /// The address that was requested
        addr: SocketAddr,
        /// The underlying server error
        #[source]
        source: hyper::Error,
    },

    /// The server task ended abnormally
    #[error("Callback server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Convenience Result type alias for callback server operations.
pub type Result<T> = std::result::Result<T, CallbackServerError>;
