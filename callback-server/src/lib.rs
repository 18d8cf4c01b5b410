//! UPnP callback server for receiving event notifications.
//!
//! This crate provides a lightweight HTTP server for handling UPnP GENA `NOTIFY`
//! requests sent by devices the process has subscribed to. It has no knowledge
//! of how subscriptions are created; it only routes notifications for
//! subscriptions that have already been established.
//!
//! # Overview
//!
//! - [`CallbackServer`]: HTTP server bound to a configurable port (6767 by
//!   default) that accepts event notifications on any path.
//! - [`SubscriptionTable`]: map from subscription ID (`SID` header) to the
//!   [`EventSubscription`] handler that consumes the notification.
//! - [`parse_property_set`]: flattens a property-set body into a map of
//!   property name to value.
//!
//! # Request handling
//!
//! 1. The body is parsed as a property set. Trailing or leading text outside
//!    the root element is known firmware noise and is dropped without logging;
//!    other parse failures are logged.
//! 2. The `SID` header is looked up in the subscription table. Unknown IDs are
//!    dropped.
//! 3. Routed notifications are acknowledged with `200 OK` and an
//!    `Extended-Response` header, then handed to the subscription handler.
//!
//! Dropped requests get no HTTP response; the connection is closed.
//!
//! # Example
//!
//! ```no_run
//! use callback_server::{CallbackServer, CallbackServerConfig, EventSubscription, Notification};
//! use std::sync::Arc;
//!
//! struct Switch {
//!     sid: String,
//! }
//!
//! impl EventSubscription for Switch {
//!     fn sid(&self) -> &str {
//!         &self.sid
//!     }
//!
//!     fn handle_event(&self, notification: Notification) {
//!         if let Some(state) = notification.properties.get("BinaryState") {
//!             println!("switch is now {state}");
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = CallbackServer::start(CallbackServerConfig::default()).await?;
//!
//!     let switch = Arc::new(Switch { sid: "uuid:4af70162-1dd2-11b2-8f95-86a98a724376".into() });
//!     server.subscriptions().add(&switch).await;
//!
//!     // The table only holds a weak reference; keep `switch` alive while subscribed.
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod property_set;
mod server;
pub mod subscriptions;

pub use config::{CallbackServerConfig, DEFAULT_CALLBACK_PORT};
pub use error::{CallbackServerError, Result};
pub use property_set::{parse_property_set, PropertySetError};
pub use server::CallbackServer;
pub use subscriptions::{ChannelSubscription, EventSubscription, Notification, SubscriptionTable};
