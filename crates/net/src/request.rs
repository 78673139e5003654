//! Client requests and their outcome codes.

use crate::link::GlobalStats;
use bitflags::bitflags;
use smoltcp::wire::EthernetAddress;
use std::fmt;

/// Identifier assigned to a request when it is submitted.
pub type RequestId = u64;

bitflags! {
    /// Link and pipeline events a subscriber can wait for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: u32 {
        const ERROR = 1 << 0;
        const TX = 1 << 1;
        const RX = 1 << 2;
        const ONLINE = 1 << 3;
        const OFFLINE = 1 << 4;
        const BUFF = 1 << 5;
        const HARDWARE = 1 << 6;
        const SOFTWARE = 1 << 7;
    }
}

bitflags! {
    /// Per-request framing and delivery flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IoFlags: u8 {
        /// Frames are passed with their link header.
        const RAW = 1 << 7;
        /// Set on delivery when the frame was sent to the broadcast address.
        const BCAST = 1 << 6;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Read,
    Write,
    Broadcast,
    ReadOrphan,
    OnEvent,
    Online,
    Offline,
    GetGlobalStats,
    GetStationAddress,
    DeviceQuery,
    ConfigInterface,
    GetSpecialStats,
    /// Any command code the bridge does not implement.
    Other(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IoError {
    #[error("bad argument")]
    BadArgument,
    #[error("out of service")]
    OutOfService,
    #[error("software failure")]
    Software,
    #[error("transmit failure")]
    TxFailure,
    #[error("command not supported")]
    NotSupported,
    #[error("request aborted")]
    Aborted,
}

/// Detail code accompanying an [`IoError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("generic error")]
    Generic,
    #[error("buffer copy rejected")]
    BufferError,
    #[error("unit offline")]
    UnitOffline,
    #[error("bad event mask")]
    BadEvent,
    #[error("frame exceeds mtu")]
    MtuExceeded,
}

/// Static description of the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceQuery {
    pub addr_field_size: u32,
    pub mtu: u32,
    pub bps: u32,
    pub hardware_type: u32,
    pub raw_mtu: u32,
}

/// Link type number for Ethernet.
pub const HARDWARE_ETHERNET: u32 = 1;

impl Default for DeviceQuery {
    fn default() -> Self {
        Self {
            addr_field_size: 48,
            mtu: crate::command::PACKET_MTU as u32,
            bps: 100_000_000,
            hardware_type: HARDWARE_ETHERNET,
            raw_mtu: crate::command::PACKET_MAX_SIZE as u32,
        }
    }
}

/// Data returned by query commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    GlobalStats(GlobalStats),
    StationAddress {
        current: EthernetAddress,
        default: EthernetAddress,
    },
    DeviceQuery(DeviceQuery),
    SpecialStats { records: usize },
}

/// Caller-supplied payload copy functions.
///
/// The bridge never touches caller memory directly; it hands bytes to
/// `copy_to_buffer` on delivery and asks `copy_from_buffer` to fill the
/// outgoing payload slot. Returning `false` rejects the copy.
pub trait BufferManagement: Send {
    fn copy_to_buffer(&mut self, payload: &[u8]) -> bool;

    /// `out` is exactly the request's data length.
    fn copy_from_buffer(&mut self, out: &mut [u8]) -> bool;

    /// Bytes held by the buffer, for implementations that own their storage.
    fn contents(&self) -> Option<&[u8]> {
        None
    }
}

/// Heap buffer used by the command line tool and tests.
#[derive(Debug, Clone, Default)]
pub struct VecBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl VecBuffer {
    /// Empty buffer accepting payloads up to `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity,
        }
    }

    pub fn from_payload(data: Vec<u8>) -> Self {
        let capacity = data.len();
        Self { data, capacity }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl BufferManagement for VecBuffer {
    fn copy_to_buffer(&mut self, payload: &[u8]) -> bool {
        if payload.len() > self.capacity {
            return false;
        }
        self.data.clear();
        self.data.extend_from_slice(payload);
        true
    }

    fn copy_from_buffer(&mut self, out: &mut [u8]) -> bool {
        if out.len() > self.data.len() {
            return false;
        }
        out.copy_from_slice(&self.data[..out.len()]);
        true
    }

    fn contents(&self) -> Option<&[u8]> {
        Some(&self.data)
    }
}

/// One client operation, owned by the bridge while it is queued.
pub struct IoRequest {
    pub(crate) id: RequestId,
    pub command: Command,
    pub flags: IoFlags,
    pub packet_type: u16,
    pub src_addr: EthernetAddress,
    pub dst_addr: EthernetAddress,
    /// Payload length: bytes to send, or bytes delivered on completion.
    pub data_length: usize,
    /// Mask to wait for, or the events that fired on completion.
    pub events: EventMask,
    pub buffers: Option<Box<dyn BufferManagement>>,
    pub error: Option<IoError>,
    pub wire_error: Option<WireError>,
    pub reply: Option<Reply>,
}

impl IoRequest {
    pub fn new(command: Command) -> Self {
        Self {
            id: 0,
            command,
            flags: IoFlags::empty(),
            packet_type: 0,
            src_addr: EthernetAddress([0; 6]),
            dst_addr: EthernetAddress([0; 6]),
            data_length: 0,
            events: EventMask::empty(),
            buffers: None,
            error: None,
            wire_error: None,
            reply: None,
        }
    }

    /// Wait for one frame of `packet_type`.
    pub fn read(packet_type: u16, buffers: impl BufferManagement + 'static) -> Self {
        Self {
            packet_type,
            buffers: Some(Box::new(buffers)),
            ..Self::new(Command::Read)
        }
    }

    /// Take any frame no typed reader claimed.
    pub fn read_orphan(buffers: impl BufferManagement + 'static) -> Self {
        Self {
            buffers: Some(Box::new(buffers)),
            ..Self::new(Command::ReadOrphan)
        }
    }

    pub fn write(
        dst: EthernetAddress,
        packet_type: u16,
        data_length: usize,
        buffers: impl BufferManagement + 'static,
    ) -> Self {
        Self {
            dst_addr: dst,
            packet_type,
            data_length,
            buffers: Some(Box::new(buffers)),
            ..Self::new(Command::Write)
        }
    }

    pub fn broadcast(
        packet_type: u16,
        data_length: usize,
        buffers: impl BufferManagement + 'static,
    ) -> Self {
        Self {
            command: Command::Broadcast,
            ..Self::write(EthernetAddress::BROADCAST, packet_type, data_length, buffers)
        }
    }

    pub fn on_event(events: EventMask) -> Self {
        Self {
            events,
            ..Self::new(Command::OnEvent)
        }
    }

    pub fn raw(mut self) -> Self {
        self.flags |= IoFlags::RAW;
        self
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn is_raw(&self) -> bool {
        self.flags.contains(IoFlags::RAW)
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Payload held by the attached buffer, if it exposes one.
    pub fn payload(&self) -> Option<&[u8]> {
        self.buffers.as_ref().and_then(|b| b.contents())
    }

    pub(crate) fn succeed(&mut self) {
        self.error = None;
        self.wire_error = None;
    }

    pub(crate) fn fail(&mut self, error: IoError, wire_error: WireError) {
        self.error = Some(error);
        self.wire_error = Some(wire_error);
    }

    pub(crate) fn abort(&mut self) {
        self.error = Some(IoError::Aborted);
        self.wire_error = None;
    }
}

impl fmt::Debug for IoRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoRequest")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("flags", &self.flags)
            .field("packet_type", &format_args!("{:#06x}", self.packet_type))
            .field("src_addr", &self.src_addr)
            .field("dst_addr", &self.dst_addr)
            .field("data_length", &self.data_length)
            .field("events", &self.events)
            .field("has_buffers", &self.buffers.is_some())
            .field("error", &self.error)
            .field("wire_error", &self.wire_error)
            .finish()
    }
}
