//! Configuration for the callback server.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Port the callback server listens on unless configured otherwise.
pub const DEFAULT_CALLBACK_PORT: u16 = 6767;

/// Configuration for [`CallbackServer`](crate::CallbackServer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackServerConfig {
    /// Address to bind the listener to
    /// Default: 0.0.0.0
    pub bind_address: IpAddr,

    /// Port to listen on; 0 lets the operating system pick one
    /// Default: 6767
    pub port: u16,
}

impl Default for CallbackServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_CALLBACK_PORT,
        }
    }
}

impl CallbackServerConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    /// The socket address the listener binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
