//! The `config` command - show or save the effective settings.

use crate::settings as settings_file;
use clap::Args;
use daynalink_core::Settings;
use std::path::PathBuf;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the settings to this path (TOML when it ends in .toml)
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Print as TOML instead of the prefs format
    #[arg(long)]
    pub toml: bool,
}

pub async fn run(settings: &Settings, args: ConfigArgs) -> anyhow::Result<()> {
    settings.validate()?;

    if args.toml {
        print!("{}", toml::to_string_pretty(settings)?);
    } else {
        print!("{}", settings.to_prefs());
    }

    if let Some(path) = args.save {
        settings_file::save(settings, &path)?;
        eprintln!("Saved settings to {}", path.display());
    }
    Ok(())
}
