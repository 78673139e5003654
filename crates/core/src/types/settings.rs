use super::ScsiMode;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Longest device name that fits the on-disk field (108 bytes incl. NUL).
pub const DEVICE_NAME_MAX_LEN: usize = 107;
/// Longest SSID that fits the 64-byte join record.
pub const SSID_MAX_LEN: usize = 63;
/// Longest pre-shared key that fits the 64-byte join record.
pub const KEY_MAX_LEN: usize = 63;

pub const DEFAULT_DEVICE_NAME: &str = "/dev/sg";

const KEY_DEVICE: &str = "DEVICE";
const KEY_DEVICE_ID: &str = "DEVICEID";
const KEY_PRIORITY: &str = "PRIORITY";
const KEY_MODE: &str = "MODE";
const KEY_AUTOCONNECT: &str = "AUTOCONNECT";
const KEY_SSID: &str = "SSID";
const KEY_KEY: &str = "KEY";

/// Session settings, loaded before the worker starts and immutable after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Device node prefix; the device index is appended (e.g. `/dev/sg` + `4`).
    pub device_name: String,
    /// SCSI device index 0-7, or `None` to auto-detect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<u8>,
    /// Worker priority, -128..=127. Higher runs sooner.
    pub task_priority: i8,
    pub scsi_mode: ScsiMode,
    /// Join `ssid` at startup if not already connected to it.
    pub auto_connect: bool,
    pub ssid: String,
    pub key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            device_id: None,
            task_priority: 0,
            scsi_mode: ScsiMode::default(),
            auto_connect: false,
            ssid: String::new(),
            key: String::new(),
        }
    }
}

impl Settings {
    /// Parse `KEY=VALUE` lines.
    ///
    /// Keys are matched case-insensitively and unknown keys are ignored. When
    /// no line carries a recognised key the defaults are returned untouched.
    pub fn from_prefs(text: &str) -> Self {
        let mut settings = Settings::default();
        let mut matches = 0usize;

        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim_end_matches(['\r', '\n']);

            if key.eq_ignore_ascii_case(KEY_DEVICE) {
                settings.device_name = truncated(value, DEVICE_NAME_MAX_LEN);
            } else if key.eq_ignore_ascii_case(KEY_DEVICE_ID) {
                settings.device_id = u8::try_from(lenient_int(value))
                    .ok()
                    .filter(|id| *id <= 7);
            } else if key.eq_ignore_ascii_case(KEY_PRIORITY) {
                settings.task_priority = lenient_int(value).clamp(-128, 127) as i8;
            } else if key.eq_ignore_ascii_case(KEY_MODE) {
                let mode = lenient_int(value).clamp(0, i64::from(u16::MAX)) as u16;
                settings.scsi_mode = ScsiMode::from_u16(mode);
            } else if key.eq_ignore_ascii_case(KEY_AUTOCONNECT) {
                settings.auto_connect = lenient_int(value) != 0;
            } else if key.eq_ignore_ascii_case(KEY_SSID) {
                settings.ssid = truncated(value, SSID_MAX_LEN);
            } else if key.eq_ignore_ascii_case(KEY_KEY) {
                settings.key = truncated(value, KEY_MAX_LEN);
            } else {
                continue;
            }
            matches += 1;
        }

        if matches == 0 {
            return Settings::default();
        }
        settings
    }

    /// Render the settings in the same `KEY=VALUE` format `from_prefs` reads.
    pub fn to_prefs(&self) -> String {
        let device_id = self.device_id.map_or(-1, i16::from);
        let mut out = String::new();
        let _ = writeln!(out, "{KEY_DEVICE}={}", self.device_name);
        let _ = writeln!(out, "{KEY_DEVICE_ID}={device_id}");
        let _ = writeln!(out, "{KEY_PRIORITY}={}", self.task_priority);
        let _ = writeln!(out, "{KEY_MODE}={}", self.scsi_mode.as_u16());
        let _ = writeln!(out, "{KEY_AUTOCONNECT}={}", u8::from(self.auto_connect));
        let _ = writeln!(out, "{KEY_SSID}={}", self.ssid);
        let _ = writeln!(out, "{KEY_KEY}={}", self.key);
        out
    }

    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::from_prefs(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_prefs())?;
        Ok(())
    }

    /// Check the limits the transport records impose.
    pub fn validate(&self) -> Result<()> {
        if self.device_name.is_empty() {
            return Err(Error::InvalidConfig("device name not set".to_string()));
        }
        if self.device_id.is_some_and(|id| id > 7) {
            return Err(Error::InvalidConfig(
                "device id must be between 0 and 7".to_string(),
            ));
        }
        if self.ssid.len() > SSID_MAX_LEN {
            return Err(Error::InvalidConfig(format!(
                "ssid longer than {SSID_MAX_LEN} bytes"
            )));
        }
        if self.key.len() > KEY_MAX_LEN {
            return Err(Error::InvalidConfig(format!(
                "key longer than {KEY_MAX_LEN} bytes"
            )));
        }
        Ok(())
    }

    /// Path of the device node for a given index.
    pub fn device_path(&self, id: u8) -> String {
        format!("{}{id}", self.device_name)
    }
}

/// Digits anywhere in the value form the number; any `-` makes it negative.
fn lenient_int(value: &str) -> i64 {
    let mut out: i64 = 0;
    let mut negative = false;
    for c in value.chars() {
        if let Some(digit) = c.to_digit(10) {
            out = out.saturating_mul(10).saturating_add(i64::from(digit));
        } else if c == '-' {
            negative = true;
        }
    }
    if negative { -out } else { out }
}

fn truncated(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}
