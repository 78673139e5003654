//! The `join` command - associate the adapter with a wireless network.

use crate::adapter::open_session;
use crate::commands::print_network;
use anyhow::bail;
use clap::Args;
use daynalink_core::Settings;
use daynalink_core::types::{KEY_MAX_LEN, SSID_MAX_LEN};
use std::time::Duration;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn parse_ssid(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("ssid cannot be empty".to_string());
    }
    if s.len() > SSID_MAX_LEN {
        return Err(format!("ssid cannot exceed {SSID_MAX_LEN} bytes"));
    }
    Ok(s.to_string())
}

fn parse_key(s: &str) -> Result<String, String> {
    if s.len() > KEY_MAX_LEN {
        return Err(format!("key cannot exceed {KEY_MAX_LEN} bytes"));
    }
    Ok(s.to_string())
}

#[derive(Args)]
pub struct JoinArgs {
    /// Network name
    #[arg(long, value_parser = parse_ssid)]
    pub ssid: String,

    /// Pre-shared key (empty for open networks)
    #[arg(long, default_value = "", value_parser = parse_key)]
    pub key: String,

    /// Seconds to wait for the association (0 returns once the request is accepted)
    #[arg(long, default_value = "0")]
    pub wait: u64,
}

pub async fn run(settings: &Settings, args: JoinArgs) -> anyhow::Result<()> {
    let mut session = open_session(settings)?;
    let port = session.port_mut();

    port.join_network(&args.ssid, &args.key)?;
    println!("Join requested for '{}'.", args.ssid);

    if args.wait == 0 {
        return Ok(());
    }

    let deadline = Instant::now() + Duration::from_secs(args.wait);
    loop {
        let network = port.current_network()?;
        if network.is_connected() && network.ssid() == args.ssid {
            println!("Connected:");
            print_network(&network);
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("not connected to '{}' after {} seconds", args.ssid, args.wait);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssid_limits() {
        assert_eq!(parse_ssid("office"), Ok("office".to_string()));
        assert!(parse_ssid("").is_err());
        assert!(parse_ssid(&"x".repeat(64)).is_err());
    }

    #[test]
    fn empty_key_is_allowed() {
        assert_eq!(parse_key(""), Ok(String::new()));
        assert!(parse_key(&"k".repeat(64)).is_err());
    }
}
