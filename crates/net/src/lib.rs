mod command;
mod config;
mod device;
mod error;
mod frame;
mod link;
mod queue;
mod request;
mod scheduler;
mod session;
mod transport;
mod worker;

#[cfg(target_os = "linux")]
mod sg;

#[cfg(any(test, feature = "test-utils"))]
mod testing;

pub use command::{
    DaynaPort, DeviceIdentity, MAX_NETWORK_COUNT, NetworkEntry, PACKET_MAX_SIZE, PACKET_MTU,
    ScanResults, ScanStatus,
};
pub use config::BridgeConfig;
pub use device::{BridgeHandle, Submission, Ticket};
pub use error::CommandError;
pub use frame::{
    FrameError, LinkHeader, OutgoingFrame, ReceivedFrame, encode_wire, prepare_outgoing,
};
pub use link::GlobalStats;
pub use request::{
    BufferManagement, Command, DeviceQuery, EventMask, IoError, IoFlags, IoRequest, Reply,
    RequestId, VecBuffer, WireError,
};
pub use session::{AUTO_DETECT_ORDER, Bridge, Session, open_device};
pub use transport::{CommandDescriptor, DataPhase, ScsiTransport};

#[cfg(target_os = "linux")]
pub use sg::SgTransport;

#[cfg(any(test, feature = "test-utils"))]
pub use testing::{MockAdapter, MockTransport, link_frame};
