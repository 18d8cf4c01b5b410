//! Raw discovery events and the transport seam.

use async_trait::async_trait;

use crate::error::Result;
use crate::usn::normalize_usn;

/// Search target matching root devices only.
pub const ROOT_DEVICE_TARGET: &str = "upnp:rootdevice";

/// Search target matching every device and service.
pub const ALL_TARGET: &str = "ssdp:all";

/// Kind of raw announcement delivered by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryEventKind {
    /// Response to one of our searches
    Found,
    /// `ssdp:alive` notification
    Available,
    /// `ssdp:byebye` notification
    Unavailable,
    /// `ssdp:update` notification
    Updated,
}

/// One announcement, consumed by the router in a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryEvent {
    pub kind: DiscoveryEventKind,
    pub usn: String,
    /// Description URL; absent on `byebye`
    pub location: Option<String>,
    /// `NT` header for notifications, `ST` for search responses
    pub notification_type: Option<String>,
}

impl DiscoveryEvent {
    pub fn new(kind: DiscoveryEventKind, usn: impl Into<String>) -> Self {
        Self {
            kind,
            usn: usn.into(),
            location: None,
            notification_type: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_notification_type(mut self, notification_type: impl Into<String>) -> Self {
        self.notification_type = Some(notification_type.into());
        self
    }

    /// Normalized device ID derived from the USN.
    pub fn device_id(&self) -> &str {
        normalize_usn(&self.usn)
    }
}

/// Outbound side of a discovery transport.
///
/// Inbound announcements are delivered separately as a stream of
/// [`DiscoveryEvent`]s handed to the router at construction.
#[async_trait]
pub trait DiscoveryTransport: Send + Sync + 'static {
    /// Multicast a search for `target`.
    async fn search(&self, target: &str) -> Result<()>;
}
