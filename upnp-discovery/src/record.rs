//! Resolved device records.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use url::Url;

use crate::description::{DescriptionDocument, DeviceDescription};
use crate::fetcher::FetchedDescription;

/// A device whose description has been fetched and parsed.
///
/// Records are shared as `Arc<DeviceRecord>` between the registry and every
/// listener that received the `device` event. The only mutable state is the
/// liveness timestamp and the release flag.
#[derive(Debug)]
pub struct DeviceRecord {
    id: String,
    location: Url,
    url_base: Option<String>,
    description: DeviceDescription,
    local_address: Option<IpAddr>,
    fetched_at: DateTime<Utc>,
    last_seen: Mutex<Instant>,
    released: watch::Sender<bool>,
}

impl DeviceRecord {
    /// Build a record for `id` from a fetched description.
    ///
    /// The record counts as seen at construction time.
    pub fn new(id: impl Into<String>, fetched: FetchedDescription) -> Self {
        let FetchedDescription {
            location,
            document,
            local_address,
            fetched_at,
        } = fetched;
        let DescriptionDocument { url_base, device } = document;
        let (released, _) = watch::channel(false);

        Self {
            id: id.into(),
            location,
            url_base,
            description: device,
            local_address,
            fetched_at,
            last_seen: Mutex::new(Instant::now()),
            released,
        }
    }

    /// Normalized device ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// URL the description was fetched from.
    pub fn location(&self) -> &Url {
        &self.location
    }

    /// Parsed descriptor fields.
    pub fn description(&self) -> &DeviceDescription {
        &self.description
    }

    pub fn device_type(&self) -> &str {
        &self.description.device_type
    }

    pub fn friendly_name(&self) -> &str {
        &self.description.friendly_name
    }

    /// Local interface address that routes to this device, if it could be determined.
    ///
    /// Callback URLs handed to the device must use this address.
    pub fn local_address(&self) -> Option<IpAddr> {
        self.local_address
    }

    /// When the description was fetched.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// When the device last announced itself.
    pub fn last_seen(&self) -> Instant {
        *self.last_seen.lock()
    }

    /// Refresh liveness.
    pub fn seen(&self) {
        self.seen_at(Instant::now());
    }

    /// Refresh liveness with an explicit timestamp.
    pub fn seen_at(&self, at: Instant) {
        *self.last_seen.lock() = at;
    }

    /// Time elapsed between the last announcement and `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen())
    }

    /// Base URL for the device's relative URLs: `URLBase` when declared, else the location.
    pub fn base_url(&self) -> Url {
        self.url_base
            .as_deref()
            .and_then(|base| Url::parse(base).ok())
            .unwrap_or_else(|| self.location.clone())
    }

    /// Resolve a service URL (control, event or SCPD path) against [`base_url`](Self::base_url).
    ///
    /// Absolute URLs are returned as is. `None` if the input cannot be joined.
    pub fn service_url(&self, relative: &str) -> Option<Url> {
        self.base_url().join(relative).ok()
    }

    /// Ask holders of this record to release resources tied to the device.
    ///
    /// Called by the registry when the device is forgotten. Idempotent.
    pub fn release(&self) {
        self.released.send_replace(true);
    }

    pub fn is_released(&self) -> bool {
        *self.released.borrow()
    }

    /// Watch for [`release`](Self::release).
    ///
    /// Code that owns per-device resources can await `changed()` on the
    /// receiver and tear them down. `ControlPoint::add_device_subscription`
    /// drops event subscriptions this way.
    pub fn released(&self) -> watch::Receiver<bool> {
        self.released.subscribe()
    }
}
