//! Conversion between adapter wire frames and client payloads.
//!
//! A frame read from the adapter looks like:
//!
//! ```text
//! [lenHi, lenLo, magic, 0, 0, more] [dst(6) src(6) type(2)] payload [check(4)]
//! ```
//!
//! The declared length covers the link header, payload and the four trailing
//! check bytes, which are never handed to clients. Outgoing frames carry no
//! prefix: raw requests are sent as-is, cooked requests get a synthesized
//! link header in front of the payload.

use smoltcp::wire::{EthernetAddress, EthernetFrame, EthernetProtocol};

/// Bytes the adapter prepends to every received frame.
pub const PREFIX_LEN: usize = 6;
/// Destination, source and packet type.
pub const LINK_HEADER_LEN: usize = 14;
/// Trailing link-layer check bytes counted in the declared length.
pub const CHECK_LEN: usize = 4;
/// Set in prefix byte 5 when the adapter holds more frames.
pub const MORE_PENDING_FLAG: u8 = 0x10;

const MORE_PENDING_OFFSET: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("declared frame length {0} is shorter than the check bytes")]
    LengthTooShort(usize),

    #[error("frame body of {0} bytes has no complete link header")]
    MissingHeader(usize),

    #[error("declared frame length {declared} exceeds {available} received bytes")]
    Truncated { declared: usize, available: usize },

    #[error("frame of {len} bytes exceeds buffer capacity {capacity}")]
    TooLarge { len: usize, capacity: usize },
}

/// Whether the adapter reported further frames after this read.
///
/// Valid for any read of at least the prefix, including empty reads.
pub fn more_pending(wire: &[u8]) -> bool {
    wire.get(MORE_PENDING_OFFSET)
        .is_some_and(|flag| *flag != 0)
}

/// A frame read from the adapter with its prefix and check bytes removed.
#[derive(Debug, Clone, Copy)]
pub struct ReceivedFrame<'a> {
    bytes: &'a [u8],
    more_pending: bool,
}

impl<'a> ReceivedFrame<'a> {
    pub fn parse(wire: &'a [u8]) -> Result<Self, FrameError> {
        if wire.len() < PREFIX_LEN {
            return Err(FrameError::Truncated {
                declared: PREFIX_LEN,
                available: wire.len(),
            });
        }

        let declared = usize::from(u16::from_be_bytes([wire[0], wire[1]]));
        if declared < CHECK_LEN {
            return Err(FrameError::LengthTooShort(declared));
        }

        let body_len = declared - CHECK_LEN;
        if body_len < LINK_HEADER_LEN {
            return Err(FrameError::MissingHeader(body_len));
        }

        let available = wire.len() - PREFIX_LEN;
        if body_len > available {
            return Err(FrameError::Truncated {
                declared: body_len,
                available,
            });
        }

        Ok(Self {
            bytes: &wire[PREFIX_LEN..PREFIX_LEN + body_len],
            more_pending: more_pending(wire),
        })
    }

    fn header(&self) -> EthernetFrame<&'a [u8]> {
        EthernetFrame::new_unchecked(self.bytes)
    }

    pub fn dst_addr(&self) -> EthernetAddress {
        self.header().dst_addr()
    }

    pub fn src_addr(&self) -> EthernetAddress {
        self.header().src_addr()
    }

    /// Packet type from the embedded link header, present in raw and cooked reads alike.
    pub fn packet_type(&self) -> u16 {
        u16::from(self.header().ethertype())
    }

    pub fn is_broadcast(&self) -> bool {
        self.dst_addr().is_broadcast()
    }

    pub fn more_pending(&self) -> bool {
        self.more_pending
    }

    /// Whole link frame when `raw`, otherwise the bytes after the link header.
    pub fn payload(&self, raw: bool) -> &'a [u8] {
        if raw {
            self.bytes
        } else {
            &self.bytes[LINK_HEADER_LEN..]
        }
    }
}

/// Header fields a cooked write gets prepended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkHeader {
    pub dst: EthernetAddress,
    pub src: EthernetAddress,
    pub packet_type: u16,
}

/// An outgoing frame laid out in a caller-owned buffer.
#[derive(Debug)]
pub struct OutgoingFrame<'a> {
    buf: &'a mut [u8],
    payload_offset: usize,
}

impl<'a> OutgoingFrame<'a> {
    /// Slot the request's payload must be copied into.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.payload_offset..]
    }

    /// Bytes to hand to the transport.
    pub fn as_bytes(&self) -> &[u8] {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Lay out an outgoing frame in `out`.
///
/// With a header the link header is written first and the payload slot
/// follows it; without one the frame is the payload unmodified.
pub fn prepare_outgoing<'a>(
    out: &'a mut [u8],
    header: Option<&LinkHeader>,
    payload_len: usize,
) -> Result<OutgoingFrame<'a>, FrameError> {
    let header_len = if header.is_some() { LINK_HEADER_LEN } else { 0 };
    let len = header_len + payload_len;
    if len > out.len() {
        return Err(FrameError::TooLarge {
            len,
            capacity: out.len(),
        });
    }

    let buf = &mut out[..len];
    if let Some(header) = header {
        let mut eth = EthernetFrame::new_unchecked(&mut buf[..]);
        eth.set_dst_addr(header.dst);
        eth.set_src_addr(header.src);
        eth.set_ethertype(EthernetProtocol::from(header.packet_type));
    }

    Ok(OutgoingFrame {
        buf,
        payload_offset: header_len,
    })
}

/// Wrap a link frame the way the adapter presents it on a read.
pub fn encode_wire(frame: &[u8], more_pending: bool) -> Vec<u8> {
    let declared = u16::try_from(frame.len() + CHECK_LEN).unwrap_or(u16::MAX);
    let mut wire = Vec::with_capacity(PREFIX_LEN + frame.len() + CHECK_LEN);
    wire.extend_from_slice(&declared.to_be_bytes());
    wire.extend_from_slice(&[0, 0, 0]);
    wire.push(if more_pending { MORE_PENDING_FLAG } else { 0 });
    wire.extend_from_slice(frame);
    wire.extend_from_slice(&[0; CHECK_LEN]);
    wire
}
