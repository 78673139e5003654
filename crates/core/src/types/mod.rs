mod settings;

pub use settings::{
    DEVICE_NAME_MAX_LEN, DEFAULT_DEVICE_NAME, KEY_MAX_LEN, SSID_MAX_LEN, Settings,
};

use serde::{Deserialize, Serialize};

/// Read-command encoding used when polling the adapter for frames.
///
/// The three encodings are wire compatible with the same firmware but suit
/// different host SCSI drivers. The mode is fixed for a whole session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScsiMode {
    /// Plain DaynaPORT read (`0x08`).
    DaynaPort,
    /// Vendor read with the `0xA8` magic, for drivers that pad short reads.
    #[default]
    ScsiDevice,
    /// Vendor read with the `0xA9` magic, for single-write drivers.
    SingleWrite,
}

impl ScsiMode {
    /// Numeric selector as stored in the settings file.
    pub fn as_u16(self) -> u16 {
        match self {
            ScsiMode::DaynaPort => 0,
            ScsiMode::ScsiDevice => 1,
            ScsiMode::SingleWrite => 2,
        }
    }

    /// Values above 2 clamp to [`ScsiMode::SingleWrite`].
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => ScsiMode::DaynaPort,
            1 => ScsiMode::ScsiDevice,
            _ => ScsiMode::SingleWrite,
        }
    }
}
