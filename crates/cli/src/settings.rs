//! Loading and saving settings files.
//!
//! Two formats are accepted: the adapter's native `KEY=VALUE` prefs file,
//! and TOML for paths ending in `.toml`.

use anyhow::Context;
use daynalink_core::Settings;
use std::path::Path;

/// Prefs file read when no `--config` is given.
pub const DEFAULT_PREFS_FILE: &str = "daynalink.prefs";

fn is_toml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

/// Load settings from `path`, or from [`DEFAULT_PREFS_FILE`] if unset.
/// A missing prefs file yields the defaults; a missing TOML file is an error.
pub fn load(path: Option<&Path>) -> anyhow::Result<Settings> {
    let path = path.unwrap_or(Path::new(DEFAULT_PREFS_FILE));
    if is_toml(path) {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return toml::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()));
    }
    Settings::load(path).with_context(|| format!("failed to load {}", path.display()))
}

pub fn save(settings: &Settings, path: &Path) -> anyhow::Result<()> {
    if is_toml(path) {
        let text = toml::to_string_pretty(settings).context("failed to encode settings")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        return Ok(());
    }
    settings
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use daynalink_core::ScsiMode;

    #[test]
    fn toml_settings_keep_their_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");
        let settings = Settings {
            device_id: Some(5),
            scsi_mode: ScsiMode::SingleWrite,
            auto_connect: true,
            ssid: "office".to_string(),
            ..Settings::default()
        };

        save(&settings, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("scsi_mode = \"single-write\""));
        assert_eq!(load(Some(path.as_path())).unwrap(), settings);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");
        std::fs::write(&path, "ssid = \"lab\"\n").unwrap();

        let settings = load(Some(path.as_path())).unwrap();
        assert_eq!(settings.ssid, "lab");
        assert_eq!(settings.device_id, None);
        assert_eq!(settings.device_name, "/dev/sg");
    }

    #[test]
    fn missing_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(dir.path().join("absent.toml").as_path())).is_err());
    }

    #[test]
    fn prefs_files_use_native_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daynalink.prefs");
        std::fs::write(&path, "DEVICEID=6\nMODE=0\n").unwrap();

        let settings = load(Some(path.as_path())).unwrap();
        assert_eq!(settings.device_id, Some(6));
        assert_eq!(settings.scsi_mode, ScsiMode::DaynaPort);

        assert_eq!(
            load(Some(dir.path().join("missing.prefs").as_path())).unwrap(),
            Settings::default()
        );
    }
}
