//! Discovery event router.
//!
//! A single worker task owns the [`DeviceRegistry`]. Announcements from the
//! transport and commands from [`DiscoveryRouter`] handles are processed one
//! at a time, so the lookup and placeholder reservation for an announcement
//! happen in the same step and no second fetch can start for the same device.
//!
//! Description fetches run in their own tasks and post their result back to
//! the worker, which applies it only if the placeholder is still in place.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::DiscoveryConfig;
use crate::events::{DeviceEvent, EventHub, EventKind, EventListener, ListenerId};
use crate::fetcher::{DescriptionFetcher, FetchedDescription};
use crate::record::DeviceRecord;
use crate::registry::{DeviceRegistry, Entry, ForgetOutcome, Ticket};
use crate::transport::{DiscoveryEvent, DiscoveryEventKind, DiscoveryTransport};
use crate::usn::normalize_usn;

/// Commands processed by the router worker
enum Command {
    Forget {
        id: String,
        reply: oneshot::Sender<ForgetOutcome>,
    },
    Scrub {
        max_age: Duration,
        reply: oneshot::Sender<Vec<String>>,
    },
    Devices(oneshot::Sender<Vec<Arc<DeviceRecord>>>),
    Entry {
        id: String,
        reply: oneshot::Sender<Option<Entry>>,
    },
    FetchCompleted {
        id: String,
        ticket: Ticket,
        fetched: Option<FetchedDescription>,
    },
    Shutdown,
}

/// Handle to the discovery worker.
///
/// Dropping the handle stops the worker. In-flight fetches finish on their own
/// and their results are discarded.
pub struct DiscoveryRouter {
    commands: mpsc::UnboundedSender<Command>,
    transport: Arc<dyn DiscoveryTransport>,
    events: EventHub,
    search_target: String,
    worker: Option<JoinHandle<()>>,
}

impl DiscoveryRouter {
    /// Start the worker.
    ///
    /// `discoveries` is the announcement stream produced by `transport`.
    pub fn spawn(
        transport: Arc<dyn DiscoveryTransport>,
        discoveries: mpsc::UnboundedReceiver<DiscoveryEvent>,
        fetcher: Arc<dyn DescriptionFetcher>,
        config: DiscoveryConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let events = EventHub::new();

        let worker = Worker {
            registry: DeviceRegistry::new(events.clone()),
            events: events.clone(),
            fetcher,
            commands: commands_tx.clone(),
        };
        let handle = tokio::spawn(worker.run(discoveries, commands_rx));

        Self {
            commands: commands_tx,
            transport,
            events,
            search_target: config.search_target,
            worker: Some(handle),
        }
    }

    /// The hub `device` and `device-lost` events are published on.
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn subscribe(&self, kind: EventKind) -> EventListener {
        self.events.subscribe(kind)
    }

    pub fn subscribe_all(&self) -> EventListener {
        self.events.subscribe_all()
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Ask devices to announce themselves.
    ///
    /// Uses the configured default target when `target` is `None`. Send
    /// failures are logged; responses arrive through the transport.
    pub async fn search(&self, target: Option<&str>) {
        let target = target.unwrap_or(self.search_target.as_str());
        if let Err(e) = self.transport.search(target).await {
            warn!(target, error = %e, "Search request failed");
        }
    }

    /// Forget a device so it can be rediscovered.
    ///
    /// Accepts a bare ID, a `uuid:` UDN or a full USN.
    pub async fn forget(&self, device: &str) -> ForgetOutcome {
        let id = normalize_usn(device).to_string();
        self.request(|reply| Command::Forget { id, reply })
            .await
            .unwrap_or(ForgetOutcome::NotFound)
    }

    /// Forget every resolved device not seen within `max_age`; returns their IDs.
    pub async fn scrub(&self, max_age: Duration) -> Vec<String> {
        self.request(|reply| Command::Scrub { max_age, reply })
            .await
            .unwrap_or_default()
    }

    /// Snapshot of resolved devices.
    pub async fn devices(&self) -> Vec<Arc<DeviceRecord>> {
        self.request(Command::Devices).await.unwrap_or_default()
    }

    pub async fn device(&self, id: &str) -> Option<Arc<DeviceRecord>> {
        self.entry(id).await.and_then(|entry| entry.record().cloned())
    }

    /// Current registry entry for a device, placeholder included.
    pub async fn entry(&self, id: &str) -> Option<Entry> {
        let id = normalize_usn(id).to_string();
        self.request(|reply| Command::Entry { id, reply })
            .await
            .flatten()
    }

    /// Stop the worker and wait for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(command(reply)).is_err() {
            debug!("Discovery worker has stopped");
            return None;
        }
        response.await.ok()
    }
}

impl Drop for DiscoveryRouter {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

struct Worker {
    registry: DeviceRegistry,
    events: EventHub,
    fetcher: Arc<dyn DescriptionFetcher>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Worker {
    async fn run(
        mut self,
        mut discoveries: mpsc::UnboundedReceiver<DiscoveryEvent>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let mut transport_open = true;
        info!("Discovery router started");

        loop {
            tokio::select! {
                biased;

                event = discoveries.recv(), if transport_open => match event {
                    Some(event) => self.handle_discovery(event),
                    None => {
                        debug!("Discovery transport closed");
                        transport_open = false;
                    }
                },

                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            }
        }

        info!("Discovery router stopped");
    }

    fn handle_discovery(&mut self, event: DiscoveryEvent) {
        let id = event.device_id().to_string();
        trace!(device_id = %id, kind = ?event.kind, "Discovery event");

        match event.kind {
            DiscoveryEventKind::Found | DiscoveryEventKind::Available => {
                match self.registry.lookup(&id) {
                    Some(Entry::Resolved(record)) => record.seen(),
                    Some(Entry::Placeholder(_)) => {
                        trace!(device_id = %id, "Description fetch already in flight");
                    }
                    None => match event.location {
                        Some(location) => {
                            let ticket = self.registry.reserve(&id);
                            self.spawn_fetch(id, ticket, location);
                        }
                        None => debug!(device_id = %id, "Ignoring announcement without a location"),
                    },
                }
            }
            DiscoveryEventKind::Unavailable => {
                if self.registry.lookup(&id).is_some() {
                    self.registry.forget(&id);
                } else {
                    debug!(device_id = %id, "Unavailable notification for unknown device");
                }
            }
            DiscoveryEventKind::Updated => {
                if let Some(Entry::Resolved(record)) = self.registry.lookup(&id) {
                    record.seen();
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Forget { id, reply } => {
                let _ = reply.send(self.registry.forget(&id));
            }
            Command::Scrub { max_age, reply } => {
                let removed = self.registry.scrub(max_age);
                if !removed.is_empty() {
                    info!(count = removed.len(), "Scrubbed stale devices");
                }
                let _ = reply.send(removed);
            }
            Command::Devices(reply) => {
                let _ = reply.send(self.registry.devices());
            }
            Command::Entry { id, reply } => {
                let _ = reply.send(self.registry.lookup(&id).cloned());
            }
            Command::FetchCompleted { id, ticket, fetched } => match fetched {
                Some(fetched) => {
                    let record = Arc::new(DeviceRecord::new(id.as_str(), fetched));
                    if self.registry.resolve(&id, ticket, record.clone()) {
                        info!(
                            device_id = %id,
                            name = record.friendly_name(),
                            device_type = record.device_type(),
                            "Device resolved"
                        );
                        self.events.emit(DeviceEvent::Resolved(record));
                    }
                }
                None => {
                    debug!(device_id = %id, "Description unavailable; device stays pending");
                }
            },
            Command::Shutdown => {}
        }
    }

    fn spawn_fetch(&self, id: String, ticket: Ticket, location: String) {
        debug!(device_id = %id, %location, "Fetching device description");
        let fetcher = self.fetcher.clone();
        let commands = self.commands.clone();

        tokio::spawn(async move {
            let fetched = fetcher.fetch(&location).await;
            let _ = commands.send(Command::FetchCompleted { id, ticket, fetched });
        });
    }
}
