use std::io;

/// Failure of a single transport command.
///
/// The codec never retries; callers decide what a failure means.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("command {opcode:#04x} failed with status {status:#04x}")]
    Status {
        opcode: u8,
        status: u8,
        /// Opaque sense bytes reported by the target.
        sense: Vec<u8>,
    },

    #[error("command {opcode:#04x} transferred {actual} bytes, expected {expected}")]
    UnexpectedLength {
        opcode: u8,
        expected: usize,
        actual: usize,
    },

    #[error("device '{0}' does not identify as a DaynaPORT SCSI/Link")]
    NotTargetDevice(String),
}

impl CommandError {
    /// Sense bytes attached to a status failure, if any.
    pub fn sense(&self) -> &[u8] {
        match self {
            CommandError::Status { sense, .. } => sense,
            _ => &[],
        }
    }
}
