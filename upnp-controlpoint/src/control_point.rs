//! The control point: discovery router plus event callback server.

use std::sync::{Arc, Weak};
use std::time::Duration;

use callback_server::{CallbackServer, EventSubscription, SubscriptionTable};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use upnp_discovery::{
    DescriptionFetcher, DeviceRecord, DiscoveryEvent, DiscoveryRouter, DiscoveryTransport,
    EventKind, EventListener, ForgetOutcome, HttpFetcher, ListenerId, SsdpTransport,
};

use crate::config::ControlPointConfig;
use crate::error::Result;

/// A running UPnP control point.
///
/// Owns the discovery router, the event callback server and the background
/// scrub task. Dropping it stops all three; the scrub task exits on its next
/// tick once the router is gone.
pub struct ControlPoint {
    router: Arc<DiscoveryRouter>,
    server: CallbackServer,
    scrubber: Option<JoinHandle<()>>,
    config: ControlPointConfig,
}

impl ControlPoint {
    /// Start a control point on the network using SSDP and HTTP.
    pub async fn start(config: ControlPointConfig) -> Result<Self> {
        config.validate()?;
        let (transport, announcements) = SsdpTransport::bind().await?;
        if !transport.is_listening() {
            info!("Passive announcements unavailable; relying on search responses");
        }
        let fetcher = HttpFetcher::new(config.discovery.fetch_timeout)?;

        Self::with_parts(config, Arc::new(transport), announcements, Arc::new(fetcher)).await
    }

    /// Start a control point over the given transport and fetcher.
    ///
    /// `announcements` is the event stream produced by `transport`.
    pub async fn with_parts(
        config: ControlPointConfig,
        transport: Arc<dyn DiscoveryTransport>,
        announcements: mpsc::UnboundedReceiver<DiscoveryEvent>,
        fetcher: Arc<dyn DescriptionFetcher>,
    ) -> Result<Self> {
        config.validate()?;

        let server = CallbackServer::start(config.callback.clone()).await?;
        let router = Arc::new(DiscoveryRouter::spawn(
            transport,
            announcements,
            fetcher,
            config.discovery.clone(),
        ));

        let scrubber = config
            .scrub_interval
            .map(|interval| spawn_scrubber(Arc::downgrade(&router), interval, config.max_age));

        if config.search_on_start {
            router.search(None).await;
        }

        info!(callback_port = server.port(), "Control point started");

        Ok(Self {
            router,
            server,
            scrubber,
            config,
        })
    }

    pub fn config(&self) -> &ControlPointConfig {
        &self.config
    }

    /// Search for devices; `None` uses the configured default target.
    pub async fn search(&self, target: Option<&str>) {
        self.router.search(target).await;
    }

    /// Forget a device by ID, UDN or USN so it can be rediscovered.
    pub async fn forget(&self, device: &str) -> ForgetOutcome {
        self.router.forget(device).await
    }

    /// Forget resolved devices not seen within `max_age`.
    pub async fn scrub(&self, max_age: Duration) -> Vec<String> {
        self.router.scrub(max_age).await
    }

    pub async fn devices(&self) -> Vec<Arc<DeviceRecord>> {
        self.router.devices().await
    }

    pub async fn device(&self, id: &str) -> Option<Arc<DeviceRecord>> {
        self.router.device(id).await
    }

    /// Listen for `device` or `device-lost` events.
    pub fn subscribe(&self, kind: EventKind) -> EventListener {
        self.router.subscribe(kind)
    }

    pub fn subscribe_all(&self) -> EventListener {
        self.router.subscribe_all()
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.router.unsubscribe(id)
    }

    /// Route notifications for `subscription` to it.
    ///
    /// Only a weak reference is kept; the caller owns the subscription.
    pub async fn add_subscription<S: EventSubscription>(&self, subscription: &Arc<S>) {
        self.server.subscriptions().add(subscription).await;
    }

    /// Route notifications for `subscription` until `device` is forgotten.
    ///
    /// The subscription is removed from the table once the device's record is
    /// released, whether by `forget`, a byebye notification or a scrub.
    pub async fn add_device_subscription<S: EventSubscription>(
        &self,
        device: &DeviceRecord,
        subscription: &Arc<S>,
    ) {
        let table = self.server.subscriptions().clone();
        table.add(subscription).await;

        let sid = subscription.sid().to_string();
        let device_id = device.id().to_string();
        let mut released = device.released();
        tokio::spawn(async move {
            loop {
                let done = *released.borrow_and_update();
                if done || released.changed().await.is_err() {
                    break;
                }
            }
            if table.remove(&sid).await {
                debug!(%sid, %device_id, "Removed subscription of forgotten device");
            }
        });
    }

    pub async fn remove_subscription(&self, sid: &str) -> bool {
        self.server.subscriptions().remove(sid).await
    }

    pub fn subscriptions(&self) -> &SubscriptionTable {
        self.server.subscriptions()
    }

    pub fn callback_port(&self) -> u16 {
        self.server.port()
    }

    /// Callback URL to hand `device` when subscribing to its events.
    ///
    /// `None` if the local address used to reach the device is unknown.
    pub fn callback_url(&self, device: &DeviceRecord) -> Option<String> {
        device
            .local_address()
            .map(|address| self.server.callback_url(address))
    }

    /// Stop scrubbing, discovery and the callback server.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(scrubber) = self.scrubber.take() {
            scrubber.abort();
            let _ = scrubber.await;
        }

        match Arc::try_unwrap(self.router) {
            Ok(router) => router.shutdown().await,
            Err(_) => debug!("Discovery router still referenced; it stops when released"),
        }

        self.server.shutdown().await?;
        info!("Control point stopped");
        Ok(())
    }
}

fn spawn_scrubber(router: Weak<DiscoveryRouter>, interval: Duration, max_age: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(handle) = router.upgrade() else {
                break;
            };
            let removed = handle.scrub(max_age).await;
            if !removed.is_empty() {
                debug!(?removed, "Background scrub forgot devices");
            }
        }
    })
}
