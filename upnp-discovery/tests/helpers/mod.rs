//! Test helpers for router and fetcher integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use upnp_discovery::{
    DescriptionDocument, DescriptionFetcher, DeviceEvent, DiscoveryConfig, DiscoveryEvent,
    DiscoveryEventKind, DiscoveryRouter, DiscoveryTransport, EventListener, FetchedDescription,
};

/// Load a description document from the fixtures directory
pub fn load_fixture(filename: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/fixtures");
    path.push(filename);

    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", filename, e))
}

/// Announcement of `kind` for `uuid:{id}::upnp:rootdevice` at a fake location
pub fn announcement(kind: DiscoveryEventKind, id: &str) -> DiscoveryEvent {
    DiscoveryEvent::new(kind, format!("uuid:{id}::upnp:rootdevice"))
        .with_location(location_for(id))
        .with_notification_type("upnp:rootdevice")
}

pub fn location_for(id: &str) -> String {
    format!("http://127.0.0.1:49153/{id}/setup.xml")
}

/// Transport that records the search targets it was asked for
#[derive(Default)]
pub struct MockTransport {
    searches: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().clone()
    }
}

#[async_trait]
impl DiscoveryTransport for MockTransport {
    async fn search(&self, target: &str) -> upnp_discovery::Result<()> {
        self.searches.lock().push(target.to_string());
        Ok(())
    }
}

/// Fetcher that serves one fixture for every location.
///
/// A gated fetcher holds each fetch until a permit is added to its gate, so
/// tests can interleave announcements with in-flight fetches.
pub struct MockFetcher {
    xml: String,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    started: mpsc::UnboundedSender<String>,
    failing: Mutex<HashSet<String>>,
}

impl MockFetcher {
    pub fn new(fixture: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        Self::build(fixture, None)
    }

    pub fn gated(fixture: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<String>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let (fetcher, started) = Self::build(fixture, Some(gate.clone()));
        (fetcher, started, gate)
    }

    fn build(fixture: &str, gate: Option<Arc<Semaphore>>) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (started, started_rx) = mpsc::unbounded_channel();
        let fetcher = Arc::new(Self {
            xml: load_fixture(fixture),
            calls: AtomicUsize::new(0),
            gate,
            started,
            failing: Mutex::new(HashSet::new()),
        });
        (fetcher, started_rx)
    }

    /// Make fetches of `location` fail softly
    pub fn fail_for(&self, location: &str) {
        self.failing.lock().insert(location.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DescriptionFetcher for MockFetcher {
    async fn fetch(&self, location: &str) -> Option<FetchedDescription> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.started.send(location.to_string());

        if let Some(gate) = &self.gate {
            gate.acquire().await.ok()?.forget();
        }

        if self.failing.lock().contains(location) {
            return None;
        }

        Some(FetchedDescription {
            location: location.parse().ok()?,
            document: DescriptionDocument::from_xml(&self.xml).ok()?,
            local_address: Some("127.0.0.1".parse().ok()?),
            fetched_at: Utc::now(),
        })
    }
}

/// Router wired to mock collaborators
pub struct Harness {
    pub router: DiscoveryRouter,
    pub transport: Arc<MockTransport>,
    announcements: mpsc::UnboundedSender<DiscoveryEvent>,
}

impl Harness {
    pub fn start(fetcher: Arc<MockFetcher>) -> Self {
        Self::start_with_config(fetcher, DiscoveryConfig::default())
    }

    pub fn start_with_config(fetcher: Arc<MockFetcher>, config: DiscoveryConfig) -> Self {
        let transport = Arc::new(MockTransport::default());
        let (announcements, discoveries) = mpsc::unbounded_channel();
        let router = DiscoveryRouter::spawn(transport.clone(), discoveries, fetcher, config);
        Self {
            router,
            transport,
            announcements,
        }
    }

    pub fn announce(&self, event: DiscoveryEvent) {
        self.announcements.send(event).expect("router stopped");
    }

    /// Wait until every announcement sent so far has been processed
    pub async fn settle(&self) {
        let _ = self.router.entry("").await;
    }
}

/// Wait for the next event, failing the test after one second
pub async fn next_event(listener: &mut EventListener) -> DeviceEvent {
    timeout(Duration::from_secs(1), listener.recv())
        .await
        .expect("Timeout waiting for device event")
        .expect("Event hub closed")
}

/// Assert that no event arrives within a short window
pub async fn assert_no_event(listener: &mut EventListener) {
    if let Ok(Some(event)) = timeout(Duration::from_millis(150), listener.recv()).await {
        panic!("Unexpected event: {:?}", event);
    }
}

/// Wait until a fetch for some location has started
pub async fn fetch_started(started: &mut mpsc::UnboundedReceiver<String>) -> String {
    timeout(Duration::from_secs(1), started.recv())
        .await
        .expect("Timeout waiting for fetch to start")
        .expect("Fetcher dropped")
}
