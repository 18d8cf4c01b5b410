//! UPnP device discovery and registry
//!
//! This crate turns raw SSDP announcements into resolved device records. Each
//! announced device is identified by the normalized ID taken from its USN; the
//! first announcement reserves a slot and starts a fetch of the device's
//! description, later announcements only refresh its liveness.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use upnp_discovery::{DeviceEvent, DiscoveryConfig, DiscoveryRouter, HttpFetcher, SsdpTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DiscoveryConfig::default();
//!     let (transport, announcements) = SsdpTransport::bind().await?;
//!     let fetcher = HttpFetcher::new(config.fetch_timeout)?;
//!     let router = DiscoveryRouter::spawn(Arc::new(transport), announcements, Arc::new(fetcher), config);
//!
//!     let mut events = router.subscribe_all();
//!     router.search(None).await;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             DeviceEvent::Resolved(device) => println!("found {} ({})", device.friendly_name(), device.id()),
//!             DeviceEvent::Lost(id) => println!("lost {id}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Liveness
//!
//! Devices re-announce periodically. [`DiscoveryRouter::scrub`] forgets
//! resolved devices that have not been seen for longer than a given age, and
//! `ssdp:byebye` notifications forget a device immediately. Either way a
//! `device-lost` event carrying the normalized ID is published.

mod config;
mod description;
mod error;
mod events;
mod fetcher;
mod record;
mod registry;
mod router;
mod ssdp;
mod transport;
mod usn;

pub use config::DiscoveryConfig;
pub use description::{DescriptionDocument, DeviceDescription, ServiceDescription, ServiceList};
pub use error::{DiscoveryError, Result};
pub use events::{DeviceEvent, EventHub, EventKind, EventListener, ListenerId};
pub use fetcher::{DescriptionFetcher, FetchedDescription, HttpFetcher};
pub use record::DeviceRecord;
pub use registry::{DeviceRegistry, Entry, ForgetOutcome, Ticket};
pub use router::DiscoveryRouter;
pub use ssdp::SsdpTransport;
pub use transport::{
    DiscoveryEvent, DiscoveryEventKind, DiscoveryTransport, ALL_TARGET, ROOT_DEVICE_TARGET,
};
pub use usn::normalize_usn;
