//! Opening the adapter through the host's SCSI passthrough.

use anyhow::Context;
use daynalink_core::Settings;
use daynalink_net::{Bridge, BridgeConfig, ScsiTransport, Session, open_device};
use std::io;

pub type HostTransport = Box<dyn ScsiTransport>;

#[cfg(target_os = "linux")]
fn open_transport(path: &str) -> io::Result<HostTransport> {
    Ok(Box::new(daynalink_net::SgTransport::open(path)?))
}

#[cfg(not(target_os = "linux"))]
fn open_transport(_path: &str) -> io::Result<HostTransport> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "SCSI generic passthrough is only available on Linux",
    ))
}

/// Find and identify the adapter for direct commands.
pub fn open_session(settings: &Settings) -> anyhow::Result<Session<HostTransport>> {
    settings.validate()?;
    open_device(settings, open_transport).context("failed to open adapter")
}

/// Find the adapter and start a bridge worker on it.
pub fn start_bridge(settings: &Settings, config: BridgeConfig) -> anyhow::Result<Bridge> {
    Bridge::open(settings, config, open_transport).context("failed to start bridge")
}
