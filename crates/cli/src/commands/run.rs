//! The `run` command - bridge the adapter until interrupted.

use crate::adapter::start_bridge;
use clap::Args;
use daynalink_core::Settings;
use daynalink_net::{BridgeConfig, BridgeHandle, EventMask, IoRequest};
use std::time::Duration;
use tracing::{info, warn};

fn parse_seconds(s: &str) -> Result<u64, String> {
    let secs: u64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if secs == 0 {
        return Err("interval must be at least 1 second".to_string());
    }
    Ok(secs)
}

fn parse_batch(s: &str) -> Result<usize, String> {
    let batch: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if batch == 0 {
        return Err("write batch must be at least 1".to_string());
    }
    Ok(batch)
}

#[derive(Args)]
pub struct RunArgs {
    /// Seconds between connectivity probes
    #[arg(long, default_value = "5", value_parser = parse_seconds)]
    pub probe_interval: u64,

    /// Writes sent per service cycle
    #[arg(long, default_value = "8", value_parser = parse_batch)]
    pub write_batch: usize,

    /// Start with the link administratively offline
    #[arg(long)]
    pub start_offline: bool,
}

impl RunArgs {
    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            probe_interval: Duration::from_secs(self.probe_interval),
            write_batch: self.write_batch,
            start_online: !self.start_offline,
            ..BridgeConfig::default()
        }
    }
}

/// Log link events until the bridge stops completing subscriptions.
async fn watch_link(handle: BridgeHandle) {
    loop {
        // Waiting on the current state would complete at once.
        let next = if handle.is_online() {
            EventMask::OFFLINE
        } else {
            EventMask::ONLINE
        };
        let submission = handle.begin_io(IoRequest::on_event(next | EventMask::ERROR));
        let Ok(request) = submission.wait().await else {
            break;
        };
        if let Some(error) = request.error {
            info!(?error, "event subscription closed");
            break;
        }
        if request.events.contains(EventMask::ERROR) {
            warn!(events = ?request.events, "adapter error");
        } else {
            info!(events = ?request.events, "link state changed");
        }
    }
}

pub async fn run(settings: &Settings, args: RunArgs) -> anyhow::Result<()> {
    let bridge = start_bridge(settings, args.bridge_config())?;
    let handle = bridge.handle();
    info!(address = %handle.station_address(), "bridge running, press Ctrl+C to stop");

    let watcher = tokio::spawn(watch_link(handle.clone()));
    tokio::signal::ctrl_c().await?;

    eprintln!("Stopping bridge...");
    bridge.shutdown().await?;
    let _ = watcher.await;

    let stats = handle.global_stats();
    println!("Packets received: {}", stats.packets_received);
    println!("Packets sent:     {}", stats.packets_sent);
    println!("Unknown types:    {}", stats.unknown_types_received);
    println!("Bad frames:       {}", stats.bad_data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_map_onto_bridge_config() {
        let args = RunArgs {
            probe_interval: 2,
            write_batch: 4,
            start_offline: true,
        };
        let config = args.bridge_config();
        assert_eq!(config.probe_interval, Duration::from_secs(2));
        assert_eq!(config.write_batch, 4);
        assert!(!config.start_online);
        assert_eq!(config.fast_interval, BridgeConfig::default().fast_interval);
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(parse_seconds("0").is_err());
        assert!(parse_batch("0").is_err());
        assert_eq!(parse_batch("16"), Ok(16));
    }
}
