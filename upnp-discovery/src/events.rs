//! Public device events and their listeners.
//!
//! Listeners subscribe per event kind and receive events over an unbounded
//! channel. A listener whose receiver is dropped is pruned on the next emit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::record::DeviceRecord;

/// Events published by the discovery router.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A device description was fetched and the device is now in the registry
    Resolved(Arc<DeviceRecord>),
    /// A resolved device was removed; carries its normalized ID
    Lost(String),
}

impl DeviceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DeviceEvent::Resolved(_) => EventKind::Device,
            DeviceEvent::Lost(_) => EventKind::DeviceLost,
        }
    }

    /// Normalized ID of the device the event is about.
    pub fn device_id(&self) -> &str {
        match self {
            DeviceEvent::Resolved(record) => record.id(),
            DeviceEvent::Lost(id) => id,
        }
    }
}

/// Event kinds listeners can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `device`: a device was resolved
    Device,
    /// `device-lost`: a device was forgotten
    DeviceLost,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Device => "device",
            EventKind::DeviceLost => "device-lost",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a listener for [`EventHub::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct EventListener {
    id: ListenerId,
    receiver: mpsc::UnboundedReceiver<DeviceEvent>,
}

impl EventListener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Wait for the next event. `None` once unsubscribed or the hub is gone.
    pub async fn recv(&mut self) -> Option<DeviceEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<DeviceEvent> {
        self.receiver.try_recv().ok()
    }
}

struct Listener {
    id: ListenerId,
    kinds: Vec<EventKind>,
    sender: mpsc::UnboundedSender<DeviceEvent>,
}

/// Fan-out of device events to subscribed listeners.
///
/// Cloning yields a handle to the same set of listeners.
#[derive(Clone, Default)]
pub struct EventHub {
    listeners: Arc<Mutex<Vec<Listener>>>,
    next_id: Arc<AtomicU64>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen for events of one kind.
    pub fn subscribe(&self, kind: EventKind) -> EventListener {
        self.register(vec![kind])
    }

    /// Listen for both `device` and `device-lost`, in emission order.
    pub fn subscribe_all(&self) -> EventListener {
        self.register(vec![EventKind::Device, EventKind::DeviceLost])
    }

    /// Remove a listener. Its receiver yields `None` after draining.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub(crate) fn emit(&self, event: DeviceEvent) {
        let kind = event.kind();
        self.listeners.lock().retain(|listener| {
            if !listener.kinds.contains(&kind) {
                return !listener.sender.is_closed();
            }
            listener.sender.send(event.clone()).is_ok()
        });
    }

    fn register(&self, kinds: Vec<EventKind>) -> EventListener {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        self.listeners.lock().push(Listener { id, kinds, sender });
        EventListener { id, receiver }
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
