//! In-memory adapter for tests.
//!
//! `MockTransport` answers the DaynaPORT command set from a shared
//! [`MockAdapter`] state. Clones share that state, so a test can hand one
//! clone to the bridge and keep another to inject frames and inspect what
//! was sent.

use crate::command::{NETWORK_ENTRY_LEN, NetworkEntry};
use crate::frame::encode_wire;
use crate::transport::{CommandDescriptor, DataPhase, ScsiTransport};
use smoltcp::wire::EthernetAddress;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const CHECK_CONDITION: u8 = 0x02;

/// Adapter state behind a [`MockTransport`].
#[derive(Debug)]
pub struct MockAdapter {
    identity: [u8; 36],
    /// Truncate the inquiry reply to this many bytes.
    pub inquiry_len: Option<usize>,
    /// Fail every command with this opcode, reporting these sense bytes.
    pub fail_opcode: Option<(u8, Vec<u8>)>,
    pub mac: EthernetAddress,
    pub mac_len: usize,
    pub enabled: bool,
    pub enable_calls: Vec<bool>,
    /// Network reported by the info command; `None` means no association.
    pub network: Option<NetworkEntry>,
    pub scan_results: Vec<NetworkEntry>,
    /// Report this byte length instead of the real one in scan results.
    pub scan_results_len_override: Option<usize>,
    /// Busy polls left before a started scan completes.
    scan_polls: Option<usize>,
    pub joins: Vec<(String, String)>,
    pub multicast: Vec<EthernetAddress>,
    /// Link frames (header and payload) waiting to be read.
    pub inbound: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
    /// Number of upcoming sends that fail.
    pub fail_sends: usize,
    /// Number of upcoming receives that fail.
    pub fail_receives: usize,
    /// Report this transfer length for every receive.
    pub receive_len_override: Option<usize>,
    pub commands: Vec<[u8; 6]>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        let mut network = NetworkEntry {
            bssid: [0x02, 0x11, 0x22, 0x33, 0x44, 0x55],
            rssi: -45,
            channel: 11,
            ..NetworkEntry::default()
        };
        let _ = network.ssid.push_str("mocknet");

        let mut adapter = Self {
            identity: [0; 36],
            inquiry_len: None,
            fail_opcode: None,
            mac: EthernetAddress([0x00, 0x80, 0x19, 0x12, 0x34, 0x56]),
            mac_len: 6,
            enabled: false,
            enable_calls: Vec::new(),
            network: Some(network),
            scan_results: Vec::new(),
            scan_results_len_override: None,
            scan_polls: None,
            joins: Vec::new(),
            multicast: Vec::new(),
            inbound: VecDeque::new(),
            sent: Vec::new(),
            fail_sends: 0,
            fail_receives: 0,
            receive_len_override: None,
            commands: Vec::new(),
        };
        adapter.set_identity("Dayna", "SCSI/Link");
        adapter
    }
}

impl MockAdapter {
    pub fn set_identity(&mut self, vendor: &str, product: &str) {
        let mut identity = [b' '; 36];
        identity[..8].copy_from_slice(&[0x09, 0, 0x02, 0x02, 31, 0, 0, 0]);
        let vendor = &vendor.as_bytes()[..vendor.len().min(8)];
        let product = &product.as_bytes()[..product.len().min(16)];
        identity[8..8 + vendor.len()].copy_from_slice(vendor);
        identity[16..16 + product.len()].copy_from_slice(product);
        identity[32..36].copy_from_slice(b"2.0f");
        self.identity = identity;
    }

    /// Drop the association, as if the access point went away.
    pub fn lose_signal(&mut self) {
        if let Some(network) = self.network.as_mut() {
            network.rssi = 0;
        }
    }

    pub fn restore_signal(&mut self) {
        if let Some(network) = self.network.as_mut() {
            network.rssi = -45;
        }
    }

    fn execute(&mut self, cmd: &mut CommandDescriptor, data: DataPhase<'_>) {
        let cdb = *cmd.cdb();
        self.commands.push(cdb);

        if let Some((opcode, sense)) = &self.fail_opcode {
            if *opcode == cdb[0] {
                let n = sense.len().min(cmd.sense.len());
                cmd.sense[..n].copy_from_slice(&sense[..n]);
                cmd.sense_len = n;
                cmd.status = CHECK_CONDITION;
                return;
            }
        }

        let reply: Option<Vec<u8>> = match (cdb[0], cdb[1]) {
            (0x12, _) => {
                let len = self.inquiry_len.unwrap_or(self.identity.len());
                Some(self.identity[..len.min(self.identity.len())].to_vec())
            }
            (0x0e, _) => {
                let on = cdb[5] & 0x80 != 0;
                self.enabled = on;
                self.enable_calls.push(on);
                None
            }
            (0x0d, _) => {
                if let DataPhase::Out(bytes) = &data {
                    if let Ok(addr) = <[u8; 6]>::try_from(&bytes[..bytes.len().min(6)]) {
                        self.multicast.push(EthernetAddress(addr));
                    }
                }
                None
            }
            (0x0a, _) => {
                if self.fail_sends > 0 {
                    self.fail_sends -= 1;
                    cmd.status = CHECK_CONDITION;
                    return;
                }
                if let DataPhase::Out(bytes) = &data {
                    self.sent.push(bytes.to_vec());
                }
                None
            }
            (0x08, _) | (0x1c, 0x08) => {
                if self.fail_receives > 0 {
                    self.fail_receives -= 1;
                    cmd.status = CHECK_CONDITION;
                    return;
                }
                Some(self.next_read())
            }
            (0x1c, 0x01) => {
                self.scan_polls = Some(1);
                Some(vec![0xff])
            }
            (0x1c, 0x02) => Some(vec![match self.scan_polls {
                None => 0x02,
                Some(0) => 0x01,
                Some(n) => {
                    self.scan_polls = Some(n - 1);
                    0x00
                }
            }]),
            (0x1c, 0x03) => {
                let entries: Vec<u8> = self.scan_results.iter().flat_map(|e| e.encode()).collect();
                let declared = self.scan_results_len_override.unwrap_or(entries.len());
                let mut reply = (declared as u16).to_be_bytes().to_vec();
                reply.extend_from_slice(&entries);
                Some(reply)
            }
            (0x1c, 0x04) => Some(match &self.network {
                Some(entry) => {
                    let mut reply = (NETWORK_ENTRY_LEN as u16).to_be_bytes().to_vec();
                    reply.extend_from_slice(&entry.encode());
                    reply
                }
                None => vec![0, 0],
            }),
            (0x1c, 0x05) => {
                if let DataPhase::Out(bytes) = &data {
                    self.joins.push((c_field(&bytes[..64]), c_field(&bytes[64..128])));
                }
                None
            }
            (0x1c, 0x09) => Some(self.mac.as_bytes()[..self.mac_len.min(6)].to_vec()),
            _ => {
                cmd.status = CHECK_CONDITION;
                return;
            }
        };

        if let (Some(reply), DataPhase::In(buf)) = (reply, data) {
            let n = reply.len().min(buf.len());
            buf[..n].copy_from_slice(&reply[..n]);
            cmd.actual = n;
            let is_read = cdb[0] == 0x08 || (cdb[0] == 0x1c && cdb[1] == 0x08);
            if is_read {
                if let Some(len) = self.receive_len_override {
                    cmd.actual = len;
                }
            }
        }
        cmd.status = 0;
    }

    fn next_read(&mut self) -> Vec<u8> {
        if !self.enabled {
            return vec![0; 6];
        }
        match self.inbound.pop_front() {
            Some(frame) => encode_wire(&frame, !self.inbound.is_empty()),
            None => vec![0; 6],
        }
    }
}

fn c_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Transport backed by a shared [`MockAdapter`].
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    adapter: Arc<Mutex<MockAdapter>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockAdapter> {
        self.adapter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a link frame for the bridge to read.
    pub fn push_inbound(&self, frame: Vec<u8>) {
        self.state().inbound.push_back(frame);
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state().sent.clone()
    }

    pub fn commands(&self) -> Vec<[u8; 6]> {
        self.state().commands.clone()
    }
}

impl ScsiTransport for MockTransport {
    fn execute(&mut self, cmd: &mut CommandDescriptor, data: DataPhase<'_>) -> io::Result<()> {
        self.state().execute(cmd, data);
        Ok(())
    }
}

/// Build a link frame: destination, source, packet type and payload.
pub fn link_frame(
    dst: EthernetAddress,
    src: EthernetAddress,
    packet_type: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14 + payload.len());
    frame.extend_from_slice(dst.as_bytes());
    frame.extend_from_slice(src.as_bytes());
    frame.extend_from_slice(&packet_type.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}
