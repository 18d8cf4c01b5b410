//! Subscription table for routing event notifications.
//!
//! The table maps a subscription ID (the value of the `SID` header) to the
//! handler that consumes its notifications. Handlers are owned by whoever
//! created the subscription; the table keeps only a [`Weak`] reference so that
//! dropping a subscription is enough to stop routing to it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, RwLock};

/// A property-change notification delivered to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// The subscription ID from the `SID` header
    pub subscription_id: String,
    /// Event sequence number from the `SEQ` header, if present and numeric
    pub seq: Option<u32>,
    /// Flattened property set: property name to its latest value
    pub properties: HashMap<String, String>,
}

/// Consumer of notifications for one established subscription.
///
/// Implementations are invoked off the request path, after the notification has
/// been acknowledged, so a slow or panicking handler never affects the server.
pub trait EventSubscription: Send + Sync + 'static {
    /// The subscription ID this handler is registered under.
    fn sid(&self) -> &str;

    /// Consume one notification.
    fn handle_event(&self, notification: Notification);
}

/// Concurrent map from subscription ID to subscription handler.
///
/// Cloning the table is cheap and every clone refers to the same entries, so the
/// callback server and the code creating subscriptions can share one table.
#[derive(Clone, Default)]
pub struct SubscriptionTable {
    entries: Arc<RwLock<HashMap<String, Weak<dyn EventSubscription>>>>,
}

impl SubscriptionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription under its own ID.
    ///
    /// Registering a second subscription with the same ID replaces the first.
    ///
    /// # Example
    ///
    /// ```
    /// use callback_server::{ChannelSubscription, SubscriptionTable};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let table = SubscriptionTable::new();
    /// let (subscription, _rx) = ChannelSubscription::new("uuid:subscription-123");
    /// table.add(&subscription).await;
    /// assert!(table.contains("uuid:subscription-123").await);
    /// # }
    /// ```
    pub async fn add<S: EventSubscription>(&self, subscription: &Arc<S>) {
        let weak = Arc::downgrade(subscription);
        let weak: Weak<dyn EventSubscription> = weak;
        let mut entries = self.entries.write().await;
        entries.insert(subscription.sid().to_string(), weak);
    }

    /// Remove a subscription by ID. Returns `true` if an entry was removed.
    pub async fn remove(&self, sid: &str) -> bool {
        let mut entries = self.entries.write().await;
        entries.remove(sid).is_some()
    }

    /// Look up a live subscription by exact ID.
    ///
    /// Entries whose handler has been dropped are pruned and reported as absent.
    pub async fn get(&self, sid: &str) -> Option<Arc<dyn EventSubscription>> {
        {
            let entries = self.entries.read().await;
            match entries.get(sid) {
                None => return None,
                Some(weak) => {
                    if let Some(subscription) = weak.upgrade() {
                        return Some(subscription);
                    }
                }
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(sid).is_some_and(|weak| weak.strong_count() == 0) {
            entries.remove(sid);
        }
        None
    }

    /// Whether a live subscription is registered under `sid`.
    pub async fn contains(&self, sid: &str) -> bool {
        self.get(sid).await.is_some()
    }

    /// Number of registered entries, including ones not yet pruned.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the table has no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Subscription handler that forwards every notification to a channel.
#[derive(Debug)]
pub struct ChannelSubscription {
    sid: String,
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelSubscription {
    /// Create a handler for `sid` and the receiver its notifications arrive on.
    pub fn new(sid: impl Into<String>) -> (Arc<Self>, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription = Arc::new(Self {
            sid: sid.into(),
            sender,
        });
        (subscription, receiver)
    }
}

impl EventSubscription for ChannelSubscription {
    fn sid(&self) -> &str {
        &self.sid
    }

    fn handle_event(&self, notification: Notification) {
        // Receiver may be gone; the subscription is simply no longer observed
        let _ = self.sender.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(sid: &str) -> Notification {
        Notification {
            subscription_id: sid.to_string(),
            seq: Some(0),
            properties: HashMap::from([("BinaryState".to_string(), "1".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let table = SubscriptionTable::new();
        let (subscription, mut rx) = ChannelSubscription::new("uuid:sub-1");
        table.add(&subscription).await;

        let found = table.get("uuid:sub-1").await.expect("subscription should be found");
        assert_eq!(found.sid(), "uuid:sub-1");

        found.handle_event(notification("uuid:sub-1"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.properties.get("BinaryState"), Some(&"1".to_string()));
    }

    #[tokio::test]
    async fn test_lookup_is_exact() {
        let table = SubscriptionTable::new();
        let (subscription, _rx) = ChannelSubscription::new("uuid:sub-1");
        table.add(&subscription).await;

        assert!(table.get("sub-1").await.is_none());
        assert!(table.get("uuid:SUB-1").await.is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let table = SubscriptionTable::new();
        let (subscription, _rx) = ChannelSubscription::new("uuid:sub-1");
        table.add(&subscription).await;

        assert!(table.remove("uuid:sub-1").await);
        assert!(!table.remove("uuid:sub-1").await);
        assert!(table.get("uuid:sub-1").await.is_none());
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let table = SubscriptionTable::new();
        let (subscription, _rx) = ChannelSubscription::new("uuid:sub-1");
        table.add(&subscription).await;
        assert_eq!(table.len().await, 1);

        drop(subscription);

        assert!(table.get("uuid:sub-1").await.is_none());
        assert_eq!(table.len().await, 0);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let table = SubscriptionTable::new();
        let shared = table.clone();
        let (subscription, _rx) = ChannelSubscription::new("uuid:sub-1");

        shared.add(&subscription).await;
        assert!(table.contains("uuid:sub-1").await);
    }

    #[tokio::test]
    async fn test_concurrent_add_remove_and_lookup() {
        let table = SubscriptionTable::new();
        let mut subscriptions = Vec::new();
        for i in 0..32 {
            let (subscription, _rx) = ChannelSubscription::new(format!("uuid:sub-{i}"));
            subscriptions.push(subscription);
        }

        let mut handles = Vec::new();
        for subscription in subscriptions.iter().cloned() {
            let table = table.clone();
            handles.push(tokio::spawn(async move {
                table.add(&subscription).await;
                assert!(table.contains(subscription.sid()).await);
                table.remove(subscription.sid()).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(table.is_empty().await);
    }
}
