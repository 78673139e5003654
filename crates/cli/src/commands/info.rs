//! The `info` command - identify the adapter and report its state.

use crate::adapter::open_session;
use crate::commands::print_network;
use clap::Args;
use daynalink_core::Settings;

#[derive(Args)]
pub struct InfoArgs {
    /// Skip querying the wireless association
    #[arg(long)]
    pub brief: bool,
}

pub async fn run(settings: &Settings, args: InfoArgs) -> anyhow::Result<()> {
    let mut session = open_session(settings)?;

    println!(
        "Device:   {} (index {})",
        settings.device_path(session.device_id()),
        session.device_id()
    );
    println!("Identity: {}", session.identity());
    println!("Address:  {}", session.station_address());
    println!("Mode:     {:?}", session.port_mut().mode());

    if args.brief {
        return Ok(());
    }

    let network = session.port_mut().current_network()?;
    if network.is_connected() {
        println!("Network:");
        print_network(&network);
    } else {
        println!("Network:  not connected");
    }
    Ok(())
}
