//! UPnP control point
//!
//! Ties together SSDP discovery with a device registry
//! ([`upnp_discovery`]) and the GENA event callback server
//! ([`callback_server`]).
//!
//! # Example
//!
//! ```no_run
//! use upnp_controlpoint::{ControlPoint, ControlPointConfig, DeviceEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let control_point = ControlPoint::start(ControlPointConfig::default()).await?;
//!     let mut events = control_point.subscribe_all();
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             DeviceEvent::Resolved(device) => {
//!                 println!("{} at {}", device.friendly_name(), device.location());
//!                 if let Some(url) = control_point.callback_url(&device) {
//!                     println!("  events can be delivered to {url}");
//!                 }
//!             }
//!             DeviceEvent::Lost(id) => println!("{id} went away"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod control_point;
mod error;
pub mod logging;

pub use config::ControlPointConfig;
pub use control_point::ControlPoint;
pub use error::{ControlPointError, Result};

pub use callback_server::{
    CallbackServerConfig, ChannelSubscription, EventSubscription, Notification, SubscriptionTable,
    DEFAULT_CALLBACK_PORT,
};
pub use upnp_discovery::{
    normalize_usn, DeviceDescription, DeviceEvent, DeviceRecord, DiscoveryConfig, EventKind,
    EventListener, ForgetOutcome, ListenerId, ServiceDescription, ALL_TARGET, ROOT_DEVICE_TARGET,
};
