use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod adapter;
mod commands;
mod settings;

#[derive(Parser)]
#[command(name = "daynalink")]
#[command(about = "Bridge a DaynaPORT SCSI/Link adapter onto the host")]
#[command(version)]
struct Cli {
    /// Path to a settings file (`KEY=VALUE` prefs, or TOML when it ends in .toml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// SCSI device index 0-7, overriding the settings file
    #[arg(long, global = true, value_parser = parse_device_id)]
    device_id: Option<u8>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify the adapter and show its address and current network
    Info(commands::info::InfoArgs),

    /// Scan for wireless networks
    Scan(commands::scan::ScanArgs),

    /// Ask the adapter to join a wireless network
    Join(commands::join::JoinArgs),

    /// Show the effective settings, optionally saving them
    Config(commands::config::ConfigArgs),

    /// Run the bridge until interrupted
    Run(commands::run::RunArgs),

    /// Show version information
    Version,
}

fn parse_device_id(s: &str) -> Result<u8, String> {
    let id: u8 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid device index"))?;
    if id > 7 {
        return Err("device index must be between 0 and 7".to_string());
    }
    Ok(id)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = settings::load(cli.config.as_deref())?;
    if let Some(id) = cli.device_id {
        settings.device_id = Some(id);
    }

    match cli.command {
        Commands::Info(args) => commands::info::run(&settings, args).await,
        Commands::Scan(args) => commands::scan::run(&settings, args).await,
        Commands::Join(args) => commands::join::run(&settings, args).await,
        Commands::Config(args) => commands::config::run(&settings, args).await,
        Commands::Run(args) => commands::run::run(&settings, args).await,
        Commands::Version => {
            println!("daynalink {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn device_id_range() {
        assert_eq!(parse_device_id("4"), Ok(4));
        assert!(parse_device_id("8").is_err());
        assert!(parse_device_id("sg4").is_err());
    }

    #[test]
    fn global_options_follow_subcommand() {
        let cli = Cli::try_parse_from(["daynalink", "scan", "--device-id", "5", "--timeout", "3"])
            .unwrap();
        assert_eq!(cli.device_id, Some(5));
        assert!(matches!(cli.command, Commands::Scan(ref args) if args.timeout == 3));
    }
}
