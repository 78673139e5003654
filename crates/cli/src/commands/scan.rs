//! The `scan` command - list nearby wireless networks.

use crate::adapter::open_session;
use crate::commands::print_network;
use anyhow::bail;
use clap::Args;
use daynalink_core::Settings;
use daynalink_net::ScanStatus;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const MAX_TIMEOUT_SECS: u64 = 300;

fn parse_timeout(s: &str) -> Result<u64, String> {
    let secs: u64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if secs == 0 {
        return Err("timeout must be at least 1 second".to_string());
    }
    if secs > MAX_TIMEOUT_SECS {
        return Err(format!("timeout cannot exceed {MAX_TIMEOUT_SECS} seconds"));
    }
    Ok(secs)
}

#[derive(Args)]
pub struct ScanArgs {
    /// Seconds to wait for the scan to complete (1-300)
    #[arg(long, default_value = "10", value_parser = parse_timeout)]
    pub timeout: u64,
}

pub async fn run(settings: &Settings, args: ScanArgs) -> anyhow::Result<()> {
    let mut session = open_session(settings)?;
    let port = session.port_mut();

    if port.scan()? == ScanStatus::Error {
        bail!("adapter refused to start a scan");
    }

    let deadline = Instant::now() + Duration::from_secs(args.timeout);
    loop {
        match port.scan_status()? {
            ScanStatus::Complete | ScanStatus::NotRunning => break,
            ScanStatus::Error => bail!("scan failed"),
            ScanStatus::Busy => debug!("scan in progress"),
        }
        if Instant::now() >= deadline {
            bail!("scan did not complete within {} seconds", args.timeout);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    let results = port.scan_results()?;
    if results.is_empty() {
        println!("No networks found.");
        return Ok(());
    }

    println!("Found {} network(s):", results.len());
    for entry in &results {
        print_network(entry);
    }
    Ok(())
}
