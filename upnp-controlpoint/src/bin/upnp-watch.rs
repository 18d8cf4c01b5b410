use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::info;
use upnp_controlpoint::logging::{init_logging_from_env, LoggingMode};
use upnp_controlpoint::{
    CallbackServerConfig, ControlPoint, ControlPointConfig, DeviceEvent, DeviceRecord,
    DiscoveryConfig, DEFAULT_CALLBACK_PORT, ROOT_DEVICE_TARGET,
};

/// Watch UPnP devices come and go on the local network
///
/// Searches for devices, resolves their descriptions and prints every
/// resolution and loss until interrupted.
#[derive(Parser, Debug)]
#[command(name = "upnp-watch")]
#[command(version)]
struct Args {
    /// SSDP search target
    #[arg(short = 't', long, default_value = ROOT_DEVICE_TARGET)]
    search_target: String,

    /// Repeat the search every N seconds (0 searches once)
    #[arg(short = 's', long, default_value = "0")]
    search_interval: u64,

    /// Forget devices not seen for N seconds
    #[arg(long, default_value = "1800")]
    max_age: u64,

    /// Check for stale devices every N seconds (0 disables)
    #[arg(long, default_value = "60")]
    scrub_interval: u64,

    /// Description fetch timeout in seconds (0 waits indefinitely)
    #[arg(long, default_value = "0")]
    fetch_timeout: u64,

    /// Event callback server port
    #[arg(short = 'p', long, default_value_t = DEFAULT_CALLBACK_PORT)]
    port: u16,

    /// Event callback server bind address
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Print the full service list of resolved devices
    #[arg(long)]
    services: bool,
}

impl Args {
    fn to_config(&self) -> ControlPointConfig {
        let mut discovery = DiscoveryConfig::new().with_search_target(self.search_target.clone());
        if self.fetch_timeout > 0 {
            discovery = discovery.with_fetch_timeout(Duration::from_secs(self.fetch_timeout));
        }

        ControlPointConfig::new()
            .with_callback(
                CallbackServerConfig::new()
                    .with_port(self.port)
                    .with_bind_address(self.bind),
            )
            .with_discovery(discovery)
            .with_max_age(Duration::from_secs(self.max_age))
            .with_scrub_interval((self.scrub_interval > 0).then(|| Duration::from_secs(self.scrub_interval)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging_from_env(LoggingMode::Development).context("Failed to initialize logging")?;

    let control_point = ControlPoint::start(args.to_config())
        .await
        .context("Failed to start control point")?;
    info!(callback_port = control_point.callback_port(), "Watching for devices");

    let mut events = control_point.subscribe_all();
    let mut search = (args.search_interval > 0)
        .then(|| tokio::time::interval(Duration::from_secs(args.search_interval)));

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => print_event(&control_point, &event, &args),
                None => break,
            },
            _ = tick(&mut search) => control_point.search(None).await,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    control_point.shutdown().await.context("Failed to shut down")?;
    Ok(())
}

async fn tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn print_event(control_point: &ControlPoint, event: &DeviceEvent, args: &Args) {
    match event {
        DeviceEvent::Resolved(device) => {
            let callback_url = control_point.callback_url(device);
            if args.json {
                println!("{}", device_json(device, callback_url.as_deref()));
            } else {
                println!(
                    "+ {} [{}] {} at {}",
                    device.friendly_name(),
                    device.id(),
                    device.device_type(),
                    device.location()
                );
                if args.services {
                    for service in device.description().services() {
                        let events = service
                            .event_sub_url
                            .as_deref()
                            .and_then(|path| device.service_url(path))
                            .map(|url| url.to_string())
                            .unwrap_or_default();
                        println!("    {} {}", service.service_type, events);
                    }
                }
            }
        }
        DeviceEvent::Lost(id) => {
            if args.json {
                println!("{}", json!({ "event": "device-lost", "id": id }));
            } else {
                println!("- {id}");
            }
        }
    }
}

fn device_json(device: &DeviceRecord, callback_url: Option<&str>) -> serde_json::Value {
    let description = device.description();
    let services: Vec<_> = description
        .services()
        .map(|service| {
            json!({
                "type": service.service_type,
                "id": service.service_id,
                "control_url": service.control_url.as_deref().and_then(|path| device.service_url(path)).map(|url| url.to_string()),
                "event_url": service.event_sub_url.as_deref().and_then(|path| device.service_url(path)).map(|url| url.to_string()),
            })
        })
        .collect();

    json!({
        "event": "device",
        "id": device.id(),
        "name": device.friendly_name(),
        "type": device.device_type(),
        "location": device.location().as_str(),
        "local_address": device.local_address().map(|address| address.to_string()),
        "callback_url": callback_url,
        "fetched_at": device.fetched_at().to_rfc3339(),
        "services": services,
        "description": description,
    })
}
