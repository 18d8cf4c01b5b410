//! Device description fetching.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, info, warn};
use url::{Host, Url};

use crate::description::DescriptionDocument;
use crate::error::{DiscoveryError, Result};

/// Outcome of a successful description fetch.
#[derive(Debug, Clone)]
pub struct FetchedDescription {
    pub location: Url,
    pub document: DescriptionDocument,
    /// Local address of the interface the device is reachable through
    pub local_address: Option<IpAddr>,
    pub fetched_at: DateTime<Utc>,
}

/// Source of device descriptions.
///
/// Failures are soft: implementations log and return `None` rather than an
/// error, since a device that cannot be resolved right now is expected churn.
#[async_trait]
pub trait DescriptionFetcher: Send + Sync + 'static {
    async fn fetch(&self, location: &str) -> Option<FetchedDescription>;
}

/// Fetches descriptions over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher. `timeout` bounds the whole request; `None` waits indefinitely.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Fetch and parse the description at `location`, reporting why it failed.
    pub async fn fetch_description(&self, location: &str) -> Result<FetchedDescription> {
        let url = Url::parse(location)
            .map_err(|e| DiscoveryError::InvalidUrl(format!("{location}: {e}")))?;

        let local_address = match probe_local_address(&url).await {
            Ok(address) => Some(address),
            Err(e) => {
                warn!(location, error = %e, "Could not determine local address for device");
                None
            }
        };

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(DiscoveryError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let document = DescriptionDocument::from_xml(&body)?;

        Ok(FetchedDescription {
            location: url,
            document,
            local_address,
            fetched_at: Utc::now(),
        })
    }
}

#[async_trait]
impl DescriptionFetcher for HttpFetcher {
    async fn fetch(&self, location: &str) -> Option<FetchedDescription> {
        match self.fetch_description(location).await {
            Ok(fetched) => Some(fetched),
            Err(DiscoveryError::Status(status)) => {
                info!(location, status, "Device description request was not successful");
                None
            }
            Err(DiscoveryError::Parse(reason)) => {
                debug!(location, %reason, "Ignoring unparseable device description");
                None
            }
            Err(e) => {
                debug!(location, error = %e, "Device description fetch failed");
                None
            }
        }
    }
}

/// Find the local address the OS would use to reach the host in `url`.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
async fn probe_local_address(url: &Url) -> io::Result<IpAddr> {
    let port = url.port_or_known_default().unwrap_or(80);
    let target = match url.host() {
        Some(Host::Ipv4(ip)) => SocketAddr::new(IpAddr::V4(ip), port),
        Some(Host::Ipv6(ip)) => SocketAddr::new(IpAddr::V6(ip), port),
        Some(Host::Domain(domain)) => lookup_host((domain, port))
            .await?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host did not resolve"))?,
        None => return Err(io::Error::new(io::ErrorKind::InvalidInput, "URL has no host")),
    };

    let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(target).await?;
    Ok(socket.local_addr()?.ip())
}
