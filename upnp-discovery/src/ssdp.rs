//! SSDP (Simple Service Discovery Protocol) transport
//!
//! Sends M-SEARCH requests from an ephemeral socket and listens for unicast
//! search responses on it. When port 1900 can be bound, multicast NOTIFY
//! announcements are received as well.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::transport::{DiscoveryEvent, DiscoveryEventKind, DiscoveryTransport};

const SSDP_MULTICAST: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
const SSDP_PORT: u16 = 1900;

/// SSDP transport over UDP.
///
/// Receive loops run as background tasks and stop when the transport is dropped.
pub struct SsdpTransport {
    socket: Arc<UdpSocket>,
    listening: bool,
    tasks: Vec<JoinHandle<()>>,
}

impl SsdpTransport {
    /// Bind the search socket and, if possible, the NOTIFY listener.
    ///
    /// Returns the transport and the stream of announcements it receives.
    pub async fn bind() -> Result<(Self, mpsc::UnboundedReceiver<DiscoveryEvent>)> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let socket = Arc::new(UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?);
        socket.set_multicast_loop_v4(true)?;
        let mut tasks = vec![tokio::spawn(receive_loop(socket.clone(), events_tx.clone()))];

        let listening = match bind_notify_listener().await {
            Ok(listener) => {
                tasks.push(tokio::spawn(receive_loop(Arc::new(listener), events_tx)));
                true
            }
            Err(e) => {
                warn!(error = %e, "Could not listen for SSDP announcements; only search responses will be seen");
                false
            }
        };

        Ok((
            Self {
                socket,
                listening,
                tasks,
            },
            events_rx,
        ))
    }

    /// Whether multicast NOTIFY announcements are being received.
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl DiscoveryTransport for SsdpTransport {
    async fn search(&self, target: &str) -> Result<()> {
        let request = search_request(target);
        self.socket
            .send_to(request.as_bytes(), (SSDP_MULTICAST, SSDP_PORT))
            .await?;
        debug!(target, "Sent M-SEARCH");
        Ok(())
    }
}

impl Drop for SsdpTransport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn bind_notify_listener() -> std::io::Result<UdpSocket> {
    let listener = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, SSDP_PORT)).await?;
    listener.join_multicast_v4(SSDP_MULTICAST, Ipv4Addr::UNSPECIFIED)?;
    Ok(listener)
}

fn search_request(target: &str) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: 239.255.255.250:1900\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: 2\r\n\
         ST: {}\r\n\
         USER-AGENT: upnp-controlpoint/{} UPnP/1.1\r\n\
         \r\n",
        target,
        env!("CARGO_PKG_VERSION")
    )
}

async fn receive_loop(socket: Arc<UdpSocket>, events: mpsc::UnboundedSender<DiscoveryEvent>) {
    let mut buffer = vec![0u8; 4096];
    loop {
        let (size, from) = match socket.recv_from(&mut buffer).await {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "SSDP receive failed; stopping listener");
                break;
            }
        };

        let Ok(text) = std::str::from_utf8(&buffer[..size]) else {
            trace!(%from, "Ignoring non UTF-8 datagram");
            continue;
        };

        if let Some(event) = parse_message(text) {
            trace!(%from, usn = %event.usn, kind = ?event.kind, "SSDP message");
            if events.send(event).is_err() {
                break;
            }
        }
    }
}

/// Classify an SSDP datagram.
///
/// Search responses become `Found`; NOTIFY messages map on their `NTS`
/// header. Anything without a USN, including other control points'
/// M-SEARCH requests, is ignored.
pub(crate) fn parse_message(message: &str) -> Option<DiscoveryEvent> {
    let mut lines = message.lines();
    let start_line = lines.next()?.trim();

    let mut location = None;
    let mut usn = None;
    let mut nt = None;
    let mut st = None;
    let mut nts = None;

    for line in lines {
        let line = line.trim();

        if let Some(value) = extract_header_value(line, "LOCATION:") {
            location = Some(value);
        } else if let Some(value) = extract_header_value(line, "USN:") {
            usn = Some(value);
        } else if let Some(value) = extract_header_value(line, "NTS:") {
            nts = Some(value);
        } else if let Some(value) = extract_header_value(line, "NT:") {
            nt = Some(value);
        } else if let Some(value) = extract_header_value(line, "ST:") {
            st = Some(value);
        }
    }

    let (kind, notification_type) = if start_line.starts_with("HTTP/") {
        (DiscoveryEventKind::Found, st)
    } else if starts_with_ignore_case(start_line, "NOTIFY ") {
        let kind = match nts?.to_ascii_lowercase().as_str() {
            "ssdp:alive" => DiscoveryEventKind::Available,
            "ssdp:byebye" => DiscoveryEventKind::Unavailable,
            "ssdp:update" => DiscoveryEventKind::Updated,
            _ => return None,
        };
        (kind, nt)
    } else {
        return None;
    };

    Some(DiscoveryEvent {
        kind,
        usn: usn.filter(|usn| !usn.is_empty())?,
        location: location.filter(|location| !location.is_empty()),
        notification_type,
    })
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.get(..prefix.len())
        .map_or(false, |head| head.eq_ignore_ascii_case(prefix))
}

/// Extract header value from a line like "HEADER: value"
fn extract_header_value(line: &str, header: &str) -> Option<String> {
    if line.len() > header.len() && starts_with_ignore_case(line, header) {
        Some(line[header.len()..].trim().to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_response() {
        let response = "HTTP/1.1 200 OK\r\n\
            CACHE-CONTROL: max-age=86400\r\n\
            LOCATION: http://192.168.1.30:49153/setup.xml\r\n\
            ST: upnp:rootdevice\r\n\
            USN: uuid:Socket-1_0-221239K1100F0E::upnp:rootdevice\r\n\
            SERVER: Unspecified, UPnP/1.0, Unspecified\r\n\
            \r\n";

        let event = parse_message(response).unwrap();

        assert_eq!(event.kind, DiscoveryEventKind::Found);
        assert_eq!(event.location.as_deref(), Some("http://192.168.1.30:49153/setup.xml"));
        assert_eq!(event.usn, "uuid:Socket-1_0-221239K1100F0E::upnp:rootdevice");
        assert_eq!(event.notification_type.as_deref(), Some("upnp:rootdevice"));
        assert_eq!(event.device_id(), "Socket-1_0-221239K1100F0E");
    }

    #[test]
    fn test_parse_notify_alive() {
        let notify = "NOTIFY * HTTP/1.1\r\n\
            HOST: 239.255.255.250:1900\r\n\
            CACHE-CONTROL: max-age=1800\r\n\
            LOCATION: http://192.168.1.100:1400/xml/device_description.xml\r\n\
            NT: urn:schemas-upnp-org:device:ZonePlayer:1\r\n\
            NTS: ssdp:alive\r\n\
            USN: uuid:RINCON_000E58A0123456::urn:schemas-upnp-org:device:ZonePlayer:1\r\n\
            \r\n";

        let event = parse_message(notify).unwrap();

        assert_eq!(event.kind, DiscoveryEventKind::Available);
        assert_eq!(
            event.notification_type.as_deref(),
            Some("urn:schemas-upnp-org:device:ZonePlayer:1")
        );
        assert_eq!(event.device_id(), "RINCON_000E58A0123456");
    }

    #[test]
    fn test_parse_notify_byebye_without_location() {
        let notify = "NOTIFY * HTTP/1.1\r\n\
            HOST: 239.255.255.250:1900\r\n\
            NT: upnp:rootdevice\r\n\
            NTS: ssdp:byebye\r\n\
            USN: uuid:RINCON_000E58A0123456::upnp:rootdevice\r\n\
            \r\n";

        let event = parse_message(notify).unwrap();

        assert_eq!(event.kind, DiscoveryEventKind::Unavailable);
        assert_eq!(event.location, None);
    }

    #[test]
    fn test_parse_notify_update_case_insensitive() {
        let notify = "notify * HTTP/1.1\r\n\
            location: http://192.168.1.30:49153/setup.xml\r\n\
            nt: upnp:rootdevice\r\n\
            nts: SSDP:UPDATE\r\n\
            usn: uuid:hub::upnp:rootdevice\r\n\
            \r\n";

        let event = parse_message(notify).unwrap();
        assert_eq!(event.kind, DiscoveryEventKind::Updated);
        assert_eq!(event.device_id(), "hub");
    }

    #[test]
    fn test_parse_ignores_msearch_and_unknown_nts() {
        let search = search_request("ssdp:all");
        assert!(parse_message(&search).is_none());

        let notify = "NOTIFY * HTTP/1.1\r\n\
            NT: upnp:rootdevice\r\n\
            NTS: ssdp:propchange\r\n\
            USN: uuid:hub::upnp:rootdevice\r\n\
            \r\n";
        assert!(parse_message(notify).is_none());
    }

    #[test]
    fn test_parse_requires_usn() {
        let response = "HTTP/1.1 200 OK\r\n\
            LOCATION: http://192.168.1.100:1400/xml/device_description.xml\r\n\
            ST: upnp:rootdevice\r\n\
            \r\n";
        assert!(parse_message(response).is_none());
    }

    #[test]
    fn test_parse_empty_and_malformed() {
        assert!(parse_message("").is_none());
        assert!(parse_message("This is not a valid SSDP response\r\nSome random text\r\n").is_none());
    }

    #[test]
    fn test_search_request_format() {
        let request = search_request("upnp:rootdevice");
        assert!(request.starts_with("M-SEARCH * HTTP/1.1\r\n"));
        assert!(request.contains("ST: upnp:rootdevice\r\n"));
        assert!(request.contains("MAN: \"ssdp:discover\"\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_extract_header_value_case_insensitive() {
        assert_eq!(
            extract_header_value("location: http://example.com", "LOCATION:"),
            Some("http://example.com".to_string())
        );
        assert_eq!(
            extract_header_value("LoCaTiOn: http://example.com", "LOCATION:"),
            Some("http://example.com".to_string())
        );
    }

    #[test]
    fn test_extract_header_value_with_whitespace() {
        assert_eq!(
            extract_header_value("LOCATION:    http://example.com   ", "LOCATION:"),
            Some("http://example.com".to_string())
        );
        assert_eq!(extract_header_value("LOCATION: ", "LOCATION:"), Some("".to_string()));
        assert_eq!(extract_header_value("LOCATION:", "LOCATION:"), None);
    }

    #[test]
    fn test_extract_header_value_no_match() {
        assert_eq!(extract_header_value("OTHER: value", "LOCATION:"), None);
        assert_eq!(extract_header_value("LOCATIONS: value", "LOCATION:"), None);
        assert_eq!(extract_header_value("NTS: ssdp:alive", "NT:"), None);
        assert_eq!(extract_header_value("ü: value", "LOCATION:"), None);
    }
}
