//! Device registry.
//!
//! Maps normalized device IDs to either a placeholder (description fetch in
//! flight) or a resolved record. The registry does not deduplicate on its own:
//! callers check [`DeviceRegistry::lookup`] and [`DeviceRegistry::reserve`]
//! within the same synchronous step.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::events::{DeviceEvent, EventHub};
use crate::record::DeviceRecord;

/// Token identifying one reservation of a device slot.
///
/// A fetch result is only applied if the slot still holds the placeholder with
/// the same ticket, so results that outlive a `forget` are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

/// A registry slot.
#[derive(Debug, Clone)]
pub enum Entry {
    Placeholder(Ticket),
    Resolved(Arc<DeviceRecord>),
}

impl Entry {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Entry::Placeholder(_))
    }

    pub fn record(&self) -> Option<&Arc<DeviceRecord>> {
        match self {
            Entry::Resolved(record) => Some(record),
            Entry::Placeholder(_) => None,
        }
    }
}

/// Result of [`DeviceRegistry::forget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgetOutcome {
    Forgotten,
    NotFound,
}

/// Stateful map from normalized device ID to registry entry.
#[derive(Debug)]
pub struct DeviceRegistry {
    entries: HashMap<String, Entry>,
    events: EventHub,
    next_ticket: u64,
}

impl DeviceRegistry {
    /// Create an empty registry that publishes `device-lost` events on `events`.
    pub fn new(events: EventHub) -> Self {
        Self {
            entries: HashMap::new(),
            events,
            next_ticket: 0,
        }
    }

    pub fn lookup(&self, id: &str) -> Option<&Entry> {
        self.entries.get(id)
    }

    /// Install a placeholder for `id` and return its ticket.
    ///
    /// Replaces whatever the slot held; callers must check [`lookup`](Self::lookup) first.
    pub fn reserve(&mut self, id: &str) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        if self
            .entries
            .insert(id.to_string(), Entry::Placeholder(ticket))
            .is_some()
        {
            warn!(device_id = id, "Reserved a slot that was already occupied");
        }
        ticket
    }

    /// Replace the placeholder reserved with `ticket` by a resolved record.
    ///
    /// Returns `false` and leaves the registry unchanged if the slot was
    /// forgotten or reserved again since.
    pub fn resolve(&mut self, id: &str, ticket: Ticket, record: Arc<DeviceRecord>) -> bool {
        let reserved = matches!(self.entries.get(id), Some(Entry::Placeholder(t)) if *t == ticket);
        if !reserved {
            debug!(device_id = id, "Discarding description for a slot that is no longer reserved");
            return false;
        }
        self.entries.insert(id.to_string(), Entry::Resolved(record));
        true
    }

    /// Remove `id`, publish `device-lost` and release the record.
    ///
    /// Placeholders are dropped without an event, since no `device` event was
    /// ever published for them. Unknown IDs are logged and ignored.
    pub fn forget(&mut self, id: &str) -> ForgetOutcome {
        match self.entries.remove(id) {
            Some(Entry::Resolved(record)) => {
                debug!(device_id = id, "Forgetting device");
                self.events.emit(DeviceEvent::Lost(id.to_string()));
                record.release();
                ForgetOutcome::Forgotten
            }
            Some(Entry::Placeholder(_)) => {
                debug!(device_id = id, "Dropping pending device before resolution");
                ForgetOutcome::Forgotten
            }
            None => {
                warn!(device_id = id, "Attempted to forget an unknown device");
                ForgetOutcome::NotFound
            }
        }
    }

    /// Forget every resolved device not seen within `max_age`.
    ///
    /// Returns the IDs removed.
    pub fn scrub(&mut self, max_age: Duration) -> Vec<String> {
        self.scrub_at(Instant::now(), max_age)
    }

    /// [`scrub`](Self::scrub) against an explicit current time.
    pub fn scrub_at(&mut self, now: Instant, max_age: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter_map(|(id, entry)| entry.record().map(|record| (id, record)))
            .filter(|(_, record)| record.age(now) > max_age)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            self.forget(id);
        }
        expired
    }

    /// Snapshot of all resolved records.
    pub fn devices(&self) -> Vec<Arc<DeviceRecord>> {
        self.entries
            .values()
            .filter_map(|entry| entry.record().cloned())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<DeviceRecord>> {
        self.lookup(id).and_then(Entry::record).cloned()
    }

    /// Number of entries, placeholders included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
