/// Errors that can occur while establishing a bridge session.
///
/// Every variant is fatal to starting the worker and is reported once to
/// whoever asked for the session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open SCSI device '{path}': {source}")]
    DeviceOpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("inquiry of SCSI device failed")]
    InquiryFailed,

    #[error("device is not a DaynaPORT SCSI/Link device")]
    NotTargetDevice,

    #[error("failed to fetch hardware MAC address")]
    MacAddressUnavailable,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("bridge worker has exited")]
    WorkerExited,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
