//! HTTP server for receiving UPnP event notifications.

use std::net::{IpAddr, SocketAddr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use std::convert::Infallible;

use bytes::Bytes;
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn, Service};
use hyper::{Body, Request, Response, Server};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use warp::http::{Method, StatusCode};
use warp::{Filter, Reply};

use crate::config::CallbackServerConfig;
use crate::error::{CallbackServerError, Result};
use crate::property_set::parse_property_set;
use crate::subscriptions::{EventSubscription, Notification, SubscriptionTable};

/// HTTP callback server for receiving UPnP event notifications.
///
/// The server accepts `NOTIFY` (and `POST`) requests on any path, parses the
/// property-set body, looks the `SID` header up in its [`SubscriptionTable`] and
/// hands the flattened properties to the matching subscription.
///
/// Every accepted notification is answered with `200 OK` and an
/// `Extended-Response` header carrying a per-server acknowledgement counter.
/// Notifications that cannot be parsed or routed get no response at all: the
/// connection is closed without writing a status line.
///
/// # Example
///
/// ```no_run
/// use callback_server::{CallbackServer, CallbackServerConfig, ChannelSubscription};
///
/// #[tokio::main]
/// async fn main() {
///     let server = CallbackServer::start(CallbackServerConfig::default())
///         .await
///         .expect("Failed to start callback server");
///
///     let (subscription, mut rx) = ChannelSubscription::new("uuid:subscription-123");
///     server.subscriptions().add(&subscription).await;
///
///     while let Some(notification) = rx.recv().await {
///         println!("{:?}", notification.properties);
///     }
/// }
/// ```
pub struct CallbackServer {
    /// The address the listener is bound to
    local_addr: SocketAddr,
    /// Subscriptions notifications are routed to
    subscriptions: SubscriptionTable,
    /// Next acknowledgement counter value
    next_ack: Arc<AtomicU64>,
    /// Shutdown signal sender
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Server task handle
    server_handle: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Start a callback server with its own, empty subscription table.
    pub async fn start(config: CallbackServerConfig) -> Result<Self> {
        Self::with_subscriptions(config, SubscriptionTable::new()).await
    }

    /// Start a callback server routing to an existing subscription table.
    ///
    /// # Errors
    ///
    /// Returns [`CallbackServerError::Bind`] if the configured address cannot
    /// be bound.
    pub async fn with_subscriptions(
        config: CallbackServerConfig,
        subscriptions: SubscriptionTable,
    ) -> Result<Self> {
        let next_ack = Arc::new(AtomicU64::new(1));
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();

        let handler = NotifyHandler {
            subscriptions: subscriptions.clone(),
            next_ack: next_ack.clone(),
            dispatch_tx,
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let requested = config.socket_addr();

        let route = notify_route(handler);
        let make_service = make_service_fn(move |_: &AddrStream| {
            let service = warp::service(route.clone());
            async move {
                Ok::<_, Infallible>(service_fn(move |request: Request<Body>| {
                    let mut service = service.clone();
                    async move {
                        let response = match service.call(request).await {
                            Ok(response) => response,
                            Err(never) => match never {},
                        };
                        withhold_unacknowledged(response)
                    }
                }))
            }
        });

        let server = Server::try_bind(&requested)
            .map_err(|source| CallbackServerError::Bind {
                addr: requested,
                source,
            })?
            .serve(make_service);
        let local_addr = server.local_addr();
        let server = server.with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });

        tokio::spawn(run_dispatcher(dispatch_rx));
        let server_handle = tokio::spawn(async move {
            if let Err(e) = server.await {
                warn!(error = %e, "Callback server exited with error");
            }
        });

        info!(%local_addr, "Callback server listening");

        Ok(Self {
            local_addr,
            subscriptions,
            next_ack,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Get the port the server is bound to.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Get the socket address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the subscription table notifications are routed through.
    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    /// Number of notifications acknowledged so far.
    pub fn acknowledged(&self) -> u64 {
        self.next_ack.load(Ordering::SeqCst) - 1
    }

    /// Callback URL a device should post to when reached through `local_ip`.
    ///
    /// `local_ip` is the address of this host on the interface that talks to
    /// the device, so the URL is routable from the device's side.
    pub fn callback_url(&self, local_ip: IpAddr) -> String {
        format!("http://{}/", SocketAddr::new(local_ip, self.port()))
    }

    /// Shutdown the callback server gracefully.
    ///
    /// Waits for in-flight requests to complete.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.server_handle.take() {
            handle.await?;
        }

        info!(local_addr = %self.local_addr, "Callback server stopped");
        Ok(())
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Marks a reply that must not reach the device.
///
/// The route attaches it as a response extension; the connection service
/// turns such replies into a service error, which makes hyper close the
/// connection without writing anything.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("event notification dropped without a response")]
struct Unacknowledged;

fn withhold_unacknowledged(
    response: Response<Body>,
) -> std::result::Result<Response<Body>, Unacknowledged> {
    if response.extensions().get::<Unacknowledged>().is_some() {
        return Err(Unacknowledged);
    }
    Ok(response)
}

fn unacknowledged() -> warp::reply::Response {
    let mut response = warp::reply::Response::default();
    response.extensions_mut().insert(Unacknowledged);
    response
}

/// Result of processing one inbound notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Routed to a subscription and acknowledged with this counter value
    Acknowledged(u64),
    /// Body could not be parsed as a property set
    Malformed,
    /// No live subscription matches the SID header
    UnknownSubscription,
}

/// Request-path state shared by all connections.
#[derive(Clone)]
struct NotifyHandler {
    subscriptions: SubscriptionTable,
    next_ack: Arc<AtomicU64>,
    dispatch_tx: mpsc::UnboundedSender<(Arc<dyn EventSubscription>, Notification)>,
}

impl NotifyHandler {
    async fn deliver(&self, sid: Option<String>, seq: Option<String>, body: &[u8]) -> Delivery {
        let xml = String::from_utf8_lossy(body);

        let properties = match parse_property_set(&xml) {
            Ok(properties) => properties,
            Err(err) if err.is_benign() => return Delivery::Malformed,
            Err(err) => {
                warn!(sid = ?sid, error = %err, "Dropping unparseable event notification");
                return Delivery::Malformed;
            }
        };

        let Some(sid) = sid else {
            debug!("Dropping event notification without SID header");
            return Delivery::UnknownSubscription;
        };

        let Some(subscription) = self.subscriptions.get(&sid).await else {
            debug!(sid = %sid, "Dropping event notification for unknown subscription");
            return Delivery::UnknownSubscription;
        };

        let counter = self.next_ack.fetch_add(1, Ordering::SeqCst);
        let notification = Notification {
            subscription_id: sid,
            seq: seq.and_then(|value| value.trim().parse().ok()),
            properties,
        };

        if self.dispatch_tx.send((subscription, notification)).is_err() {
            warn!("Notification dispatcher is gone, event not delivered");
        }

        Delivery::Acknowledged(counter)
    }
}

/// Build the catch-all notification route.
fn notify_route(
    handler: NotifyHandler,
) -> impl Filter<Extract = (warp::reply::Response,), Error = warp::Rejection> + Clone {
    warp::method()
        .and(warp::path::full())
        .and(warp::header::optional::<String>("sid"))
        .and(warp::header::optional::<String>("seq"))
        .and(warp::header::optional::<String>("nt"))
        .and(warp::header::optional::<String>("nts"))
        .and(warp::body::bytes())
        .and(warp::any().map(move || handler.clone()))
        .and_then(
            |method: Method,
             path: warp::path::FullPath,
             sid: Option<String>,
             seq: Option<String>,
             nt: Option<String>,
             nts: Option<String>,
             body: Bytes,
             handler: NotifyHandler| async move {
                if !is_notify_method(&method) {
                    return Ok::<_, warp::Rejection>(
                        StatusCode::METHOD_NOT_ALLOWED.into_response(),
                    );
                }

                trace!(
                    path = path.as_str(),
                    sid = ?sid,
                    seq = ?seq,
                    nt = ?nt,
                    nts = ?nts,
                    bytes = body.len(),
                    "Incoming event notification"
                );

                let response = match handler.deliver(sid, seq, &body).await {
                    Delivery::Acknowledged(counter) => warp::reply::with_header(
                        warp::reply(),
                        "Extended-Response",
                        acknowledgement(counter),
                    )
                    .into_response(),
                    Delivery::Malformed | Delivery::UnknownSubscription => unacknowledged(),
                };
                Ok(response)
            },
        )
}

fn is_notify_method(method: &Method) -> bool {
    method.as_str() == "NOTIFY" || method == Method::POST
}

/// Value of the `Extended-Response` acknowledgement header.
fn acknowledgement(counter: u64) -> String {
    format!("{counter} ; comment=\"Notification Acknowledged\"")
}

/// Invoke subscription handlers in arrival order.
///
/// A panicking handler is logged and skipped; later notifications still flow.
async fn run_dispatcher(
    mut rx: mpsc::UnboundedReceiver<(Arc<dyn EventSubscription>, Notification)>,
) {
    while let Some((subscription, notification)) = rx.recv().await {
        let sid = notification.subscription_id.clone();
        let outcome = catch_unwind(AssertUnwindSafe(|| subscription.handle_event(notification)));
        if outcome.is_err() {
            warn!(sid = %sid, "Subscription handler panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::ChannelSubscription;

    const BINARY_STATE: &str = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><BinaryState>1</BinaryState></e:property></e:propertyset>"#;

    fn handler() -> (NotifyHandler, mpsc::UnboundedReceiver<(Arc<dyn EventSubscription>, Notification)>) {
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let handler = NotifyHandler {
            subscriptions: SubscriptionTable::new(),
            next_ack: Arc::new(AtomicU64::new(1)),
            dispatch_tx,
        };
        (handler, dispatch_rx)
    }

    #[test]
    fn test_acknowledgement_header_value() {
        assert_eq!(
            acknowledgement(1),
            "1 ; comment=\"Notification Acknowledged\""
        );
    }

    #[test]
    fn test_unacknowledged_replies_are_withheld() {
        assert!(withhold_unacknowledged(unacknowledged()).is_err());

        let acknowledged = warp::reply::with_header(warp::reply(), "Extended-Response", acknowledgement(1))
            .into_response();
        let response = withhold_unacknowledged(acknowledged).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_notify_methods() {
        assert!(is_notify_method(&Method::from_bytes(b"NOTIFY").unwrap()));
        assert!(is_notify_method(&Method::POST));
        assert!(!is_notify_method(&Method::GET));
    }

    #[tokio::test]
    async fn test_deliver_to_registered_subscription() {
        let (handler, mut dispatched) = handler();
        let (subscription, _rx) = ChannelSubscription::new("uuid:sub-1");
        handler.subscriptions.add(&subscription).await;

        let delivery = handler
            .deliver(Some("uuid:sub-1".to_string()), Some("7".to_string()), BINARY_STATE.as_bytes())
            .await;
        assert_eq!(delivery, Delivery::Acknowledged(1));

        let (target, notification) = dispatched.recv().await.unwrap();
        assert_eq!(target.sid(), "uuid:sub-1");
        assert_eq!(notification.seq, Some(7));
        assert_eq!(notification.properties.get("BinaryState"), Some(&"1".to_string()));
    }

    #[tokio::test]
    async fn test_counter_increments_per_acknowledgement() {
        let (handler, _dispatched) = handler();
        let (subscription, _rx) = ChannelSubscription::new("uuid:sub-1");
        handler.subscriptions.add(&subscription).await;

        for expected in 1..=3 {
            let delivery = handler
                .deliver(Some("uuid:sub-1".to_string()), None, BINARY_STATE.as_bytes())
                .await;
            assert_eq!(delivery, Delivery::Acknowledged(expected));
        }

        // Unrouted notifications do not consume a counter value
        handler
            .deliver(Some("uuid:other".to_string()), None, BINARY_STATE.as_bytes())
            .await;
        let delivery = handler
            .deliver(Some("uuid:sub-1".to_string()), None, BINARY_STATE.as_bytes())
            .await;
        assert_eq!(delivery, Delivery::Acknowledged(4));
    }

    #[tokio::test]
    async fn test_unknown_subscription_not_dispatched() {
        let (handler, mut dispatched) = handler();

        let delivery = handler
            .deliver(Some("uuid:unknown".to_string()), None, BINARY_STATE.as_bytes())
            .await;
        assert_eq!(delivery, Delivery::UnknownSubscription);

        let delivery = handler.deliver(None, None, BINARY_STATE.as_bytes()).await;
        assert_eq!(delivery, Delivery::UnknownSubscription);

        assert!(dispatched.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_body_not_dispatched() {
        let (handler, mut dispatched) = handler();
        let (subscription, _rx) = ChannelSubscription::new("uuid:sub-1");
        handler.subscriptions.add(&subscription).await;

        let delivery = handler
            .deliver(Some("uuid:sub-1".to_string()), None, b"<event>test</event>")
            .await;
        assert_eq!(delivery, Delivery::Malformed);

        let trailing = format!("{BINARY_STATE}trailing");
        let delivery = handler
            .deliver(Some("uuid:sub-1".to_string()), None, trailing.as_bytes())
            .await;
        assert_eq!(delivery, Delivery::Malformed);

        assert!(dispatched.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_numeric_seq_is_ignored() {
        let (handler, mut dispatched) = handler();
        let (subscription, _rx) = ChannelSubscription::new("uuid:sub-1");
        handler.subscriptions.add(&subscription).await;

        handler
            .deliver(Some("uuid:sub-1".to_string()), Some("abc".to_string()), BINARY_STATE.as_bytes())
            .await;

        let (_, notification) = dispatched.recv().await.unwrap();
        assert_eq!(notification.seq, None);
    }

    #[tokio::test]
    async fn test_server_start_and_shutdown() {
        let config = CallbackServerConfig::new()
            .with_port(0)
            .with_bind_address(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));
        let server = CallbackServer::start(config).await.unwrap();

        assert_ne!(server.port(), 0);
        assert_eq!(server.acknowledged(), 0);
        assert_eq!(
            server.callback_url("192.168.1.10".parse().unwrap()),
            format!("http://192.168.1.10:{}/", server.port())
        );

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let config = CallbackServerConfig::new()
            .with_port(0)
            .with_bind_address(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));
        let first = CallbackServer::start(config.clone()).await.unwrap();

        let taken = config.with_port(first.port());
        let second = CallbackServer::start(taken).await;
        assert!(matches!(second, Err(CallbackServerError::Bind { .. })));

        first.shutdown().await.unwrap();
    }
}
