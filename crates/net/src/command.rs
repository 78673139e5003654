//! DaynaPORT vendor command set.
//!
//! Every operation builds a fresh six byte command block, runs it through the
//! transport and interprets the response. Nothing here retries; a failed
//! command is reported to the caller together with the target's sense bytes.

use crate::error::CommandError;
use crate::transport::{CDB_LEN, CommandDescriptor, DataPhase, ScsiTransport};
use daynalink_core::ScsiMode;
use smoltcp::wire::EthernetAddress;
use tracing::{debug, trace};

/// Largest link frame the adapter carries, header included.
pub const PACKET_MAX_SIZE: usize = 1520;
/// Largest cooked payload.
pub const PACKET_MTU: usize = 1500;
/// Receive buffer size: a full frame plus the adapter's read prefix.
pub const RECEIVE_BUFFER_SIZE: usize = PACKET_MAX_SIZE + 6;
/// Networks reported by one scan.
pub const MAX_NETWORK_COUNT: usize = 10;
/// Size of one network record on the wire.
pub const NETWORK_ENTRY_LEN: usize = 74;
pub const SSID_FIELD_LEN: usize = 64;
pub const KEY_FIELD_LEN: usize = 64;

const INQUIRY_LEN: usize = 64;
const SCAN_REPLY_LEN: usize = 4;
const SCAN_RESULTS_LEN: usize = 2 + MAX_NETWORK_COUNT * NETWORK_ENTRY_LEN;
const NETWORK_INFO_LEN: usize = 2 + NETWORK_ENTRY_LEN;
const JOIN_REQUEST_LEN: usize = SSID_FIELD_LEN + KEY_FIELD_LEN + 2;
const MAC_LEN: usize = 6;
/// Shortest successful frame read: the prefix alone.
const READ_PREFIX_LEN: usize = 6;

mod opcode {
    pub const READ_FRAME: u8 = 0x08;
    pub const WRITE_FRAME: u8 = 0x0a;
    pub const ADD_MULTICAST: u8 = 0x0d;
    pub const ENABLE: u8 = 0x0e;
    pub const INQUIRY: u8 = 0x12;
    pub const WIFI: u8 = 0x1c;
}

mod wifi {
    pub const SCAN: u8 = 0x01;
    pub const SCAN_COMPLETE: u8 = 0x02;
    pub const SCAN_RESULTS: u8 = 0x03;
    pub const INFO: u8 = 0x04;
    pub const JOIN: u8 = 0x05;
    pub const ALT_READ: u8 = 0x08;
    pub const MAC_ADDRESS: u8 = 0x09;
}

const ALT_READ_MAGIC_PATCHED: u8 = 0xa8;
const ALT_READ_MAGIC_SINGLE_WRITE: u8 = 0xa9;
const ENABLE_FLAG: u8 = 0x80;

const VENDOR_TOKEN: &[u8] = b"Dayna";
const PRODUCT_TOKEN: &[u8] = b"SCSI/Link";

/// Identity strings reported by a standard inquiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor: String,
    pub product: String,
    pub revision: String,
}

impl DeviceIdentity {
    fn parse(data: &[u8]) -> Self {
        let field = |range: std::ops::Range<usize>| {
            let end = range.end.min(data.len());
            let start = range.start.min(end);
            String::from_utf8_lossy(&data[start..end])
                .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                .to_string()
        };
        Self {
            vendor: field(8..16),
            product: field(16..32),
            revision: field(32..36),
        }
    }

    fn is_target(data: &[u8]) -> bool {
        data.len() > 26
            && data[8..13].eq_ignore_ascii_case(VENDOR_TOKEN)
            && data[16..25].eq_ignore_ascii_case(PRODUCT_TOKEN)
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.vendor, self.product, self.revision)
    }
}

/// Outcome of starting or polling a wireless scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Busy,
    Complete,
    NotRunning,
    Error,
}

/// One wireless network as reported by the adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkEntry {
    pub ssid: heapless::String<SSID_FIELD_LEN>,
    pub bssid: [u8; 6],
    /// Signal strength in dBm; zero means no signal.
    pub rssi: i8,
    pub channel: u8,
    pub flags: u8,
}

impl NetworkEntry {
    pub fn parse(record: &[u8; NETWORK_ENTRY_LEN]) -> Self {
        let raw_ssid = &record[..SSID_FIELD_LEN];
        let end = raw_ssid.iter().position(|b| *b == 0).unwrap_or(SSID_FIELD_LEN);
        let mut ssid = heapless::String::new();
        for c in String::from_utf8_lossy(&raw_ssid[..end]).chars() {
            if ssid.push(c).is_err() {
                break;
            }
        }

        let mut bssid = [0u8; 6];
        bssid.copy_from_slice(&record[64..70]);
        Self {
            ssid,
            bssid,
            rssi: record[70] as i8,
            channel: record[71],
            flags: record[72],
        }
    }

    pub fn encode(&self) -> [u8; NETWORK_ENTRY_LEN] {
        let mut record = [0u8; NETWORK_ENTRY_LEN];
        let ssid = self.ssid.as_bytes();
        record[..ssid.len()].copy_from_slice(ssid);
        record[64..70].copy_from_slice(&self.bssid);
        record[70] = self.rssi as u8;
        record[71] = self.channel;
        record[72] = self.flags;
        record
    }

    pub fn ssid(&self) -> &str {
        self.ssid.as_str()
    }

    /// A live association has a nonzero signal strength.
    pub fn is_connected(&self) -> bool {
        self.rssi != 0
    }
}

pub type ScanResults = heapless::Vec<NetworkEntry, MAX_NETWORK_COUNT>;

/// Command codec bound to one transport and one read encoding.
pub struct DaynaPort<T> {
    transport: T,
    mode: ScsiMode,
}

impl<T: ScsiTransport> DaynaPort<T> {
    pub fn new(transport: T, mode: ScsiMode) -> Self {
        Self { transport, mode }
    }

    pub fn mode(&self) -> ScsiMode {
        self.mode
    }

    fn run(
        &mut self,
        cdb: [u8; CDB_LEN],
        data: DataPhase<'_>,
    ) -> Result<CommandDescriptor, CommandError> {
        let mut cmd = CommandDescriptor::new(cdb);
        self.transport.execute(&mut cmd, data)?;
        if !cmd.succeeded() {
            debug!(
                opcode = cmd.opcode(),
                status = cmd.status,
                sense = ?cmd.sense_data(),
                "command failed"
            );
            return Err(CommandError::Status {
                opcode: cmd.opcode(),
                status: cmd.status,
                sense: cmd.sense_data().to_vec(),
            });
        }
        Ok(cmd)
    }

    fn run_in(&mut self, cdb: [u8; CDB_LEN], buf: &mut [u8]) -> Result<usize, CommandError> {
        let cmd = self.run(cdb, DataPhase::In(buf))?;
        Ok(cmd.actual)
    }

    /// Standard inquiry; only a DaynaPORT SCSI/Link identity is accepted.
    pub fn inquire(&mut self) -> Result<DeviceIdentity, CommandError> {
        let mut buf = [0u8; INQUIRY_LEN];
        let cdb = [opcode::INQUIRY, 0, 0, 0, INQUIRY_LEN as u8, 0];
        let actual = self.run_in(cdb, &mut buf)?.min(INQUIRY_LEN);
        let data = &buf[..actual];

        let identity = DeviceIdentity::parse(data);
        if !DeviceIdentity::is_target(data) {
            return Err(CommandError::NotTargetDevice(identity.to_string()));
        }
        debug!(%identity, "inquiry matched");
        Ok(identity)
    }

    fn wifi_status(&mut self, sub: u8) -> Result<u8, CommandError> {
        let mut buf = [0u8; SCAN_REPLY_LEN];
        let actual = self.run_in([opcode::WIFI, sub, 0, 0, 0, 0], &mut buf)?;
        if actual != 1 {
            return Err(CommandError::UnexpectedLength {
                opcode: opcode::WIFI,
                expected: 1,
                actual,
            });
        }
        Ok(buf[0])
    }

    /// Start a wireless scan.
    pub fn scan(&mut self) -> Result<ScanStatus, CommandError> {
        let reply = self.wifi_status(wifi::SCAN)?;
        Ok(if reply == 0xff {
            ScanStatus::Busy
        } else {
            ScanStatus::Error
        })
    }

    pub fn scan_status(&mut self) -> Result<ScanStatus, CommandError> {
        Ok(match self.wifi_status(wifi::SCAN_COMPLETE)? {
            1 => ScanStatus::Complete,
            0 => ScanStatus::Busy,
            _ => ScanStatus::NotRunning,
        })
    }

    /// Networks found by the last completed scan.
    pub fn scan_results(&mut self) -> Result<ScanResults, CommandError> {
        let mut buf = [0u8; SCAN_RESULTS_LEN];
        let actual = self
            .run_in([opcode::WIFI, wifi::SCAN_RESULTS, 0, 0, 0, 0], &mut buf)?
            .min(SCAN_RESULTS_LEN);
        if actual < 2 {
            return Err(CommandError::UnexpectedLength {
                opcode: opcode::WIFI,
                expected: 2,
                actual,
            });
        }

        let declared = usize::from(u16::from_be_bytes([buf[0], buf[1]]));
        let count = (declared / NETWORK_ENTRY_LEN)
            .min((actual - 2) / NETWORK_ENTRY_LEN)
            .min(MAX_NETWORK_COUNT);

        let mut results = ScanResults::new();
        for record in buf[2..]
            .chunks_exact(NETWORK_ENTRY_LEN)
            .take(count)
            .filter_map(|chunk| <&[u8; NETWORK_ENTRY_LEN]>::try_from(chunk).ok())
        {
            let _ = results.push(NetworkEntry::parse(record));
        }
        trace!(declared, count = results.len(), "scan results");
        Ok(results)
    }

    /// Network the adapter is associated with; all zero when not connected.
    pub fn current_network(&mut self) -> Result<NetworkEntry, CommandError> {
        let mut buf = [0u8; NETWORK_INFO_LEN];
        let actual = self
            .run_in([opcode::WIFI, wifi::INFO, 0, 0, 0, 0], &mut buf)?
            .min(NETWORK_INFO_LEN);
        if actual <= 2 {
            return Ok(NetworkEntry::default());
        }

        let declared = usize::from(u16::from_be_bytes([buf[0], buf[1]]));
        let available = declared.min(actual - 2);
        if available == 0 {
            return Ok(NetworkEntry::default());
        }
        if available < NETWORK_ENTRY_LEN {
            return Err(CommandError::UnexpectedLength {
                opcode: opcode::WIFI,
                expected: NETWORK_ENTRY_LEN,
                actual: available,
            });
        }

        let mut record = [0u8; NETWORK_ENTRY_LEN];
        record.copy_from_slice(&buf[2..2 + NETWORK_ENTRY_LEN]);
        let entry = NetworkEntry::parse(&record);
        if !entry.is_connected() {
            return Ok(NetworkEntry::default());
        }
        Ok(entry)
    }

    /// Ask the adapter to join a network.
    ///
    /// Success means the request was accepted; the association itself shows
    /// up later through `current_network`. Both strings are cut to fit their
    /// NUL terminated fields.
    pub fn join_network(&mut self, ssid: &str, key: &str) -> Result<(), CommandError> {
        let mut request = [0u8; JOIN_REQUEST_LEN];
        let ssid = &ssid.as_bytes()[..ssid.len().min(SSID_FIELD_LEN - 1)];
        let key = &key.as_bytes()[..key.len().min(KEY_FIELD_LEN - 1)];
        request[..ssid.len()].copy_from_slice(ssid);
        request[SSID_FIELD_LEN..SSID_FIELD_LEN + key.len()].copy_from_slice(key);

        let cdb = [opcode::WIFI, wifi::JOIN, 0, 0, JOIN_REQUEST_LEN as u8, 0];
        self.run(cdb, DataPhase::Out(&request))?;
        Ok(())
    }

    pub fn mac_address(&mut self) -> Result<EthernetAddress, CommandError> {
        let mut buf = [0u8; MAC_LEN];
        let actual = self.run_in([opcode::WIFI, wifi::MAC_ADDRESS, 0, 0, 0, 0], &mut buf)?;
        if actual != MAC_LEN {
            return Err(CommandError::UnexpectedLength {
                opcode: opcode::WIFI,
                expected: MAC_LEN,
                actual,
            });
        }
        Ok(EthernetAddress(buf))
    }

    /// Switch the adapter's receive ring on or off. Repeating a state is harmless.
    pub fn enable(&mut self, on: bool) -> Result<(), CommandError> {
        let flag = if on { ENABLE_FLAG } else { 0 };
        self.run([opcode::ENABLE, 0, 0, 0, 0, flag], DataPhase::None)?;
        Ok(())
    }

    pub fn add_multicast(&mut self, addr: EthernetAddress) -> Result<(), CommandError> {
        let cdb = [opcode::ADD_MULTICAST, 0, 0, MAC_LEN as u8, 0, 0];
        self.run(cdb, DataPhase::Out(addr.as_bytes()))?;
        Ok(())
    }

    pub fn send_frame(&mut self, frame: &[u8]) -> Result<(), CommandError> {
        let len = u16::try_from(frame.len()).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("frame of {} bytes is too long to send", frame.len()),
            )
        })?;
        let [hi, lo] = len.to_be_bytes();
        self.run([opcode::WRITE_FRAME, 0, 0, hi, lo, 0], DataPhase::Out(frame))?;
        Ok(())
    }

    /// Read one frame into `buf`, prefix included. Returns the byte count,
    /// which is exactly the prefix length when nothing was waiting.
    pub fn receive_frame(&mut self, buf: &mut [u8]) -> Result<usize, CommandError> {
        let capacity = buf.len().min(usize::from(u16::MAX));
        let [hi, lo] = (capacity as u16).to_be_bytes();
        let cdb = match self.mode {
            ScsiMode::DaynaPort => [opcode::READ_FRAME, 0, 0, hi, lo, 0],
            ScsiMode::ScsiDevice => [opcode::WIFI, wifi::ALT_READ, ALT_READ_MAGIC_PATCHED, hi, lo, 0],
            ScsiMode::SingleWrite => {
                [opcode::WIFI, wifi::ALT_READ, ALT_READ_MAGIC_SINGLE_WRITE, hi, lo, 0]
            }
        };

        let actual = self.run_in(cdb, &mut buf[..capacity])?;
        if actual < READ_PREFIX_LEN {
            return Err(CommandError::UnexpectedLength {
                opcode: cdb[0],
                expected: READ_PREFIX_LEN,
                actual,
            });
        }
        Ok(actual.min(capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;

    fn port(mock: &MockTransport) -> DaynaPort<MockTransport> {
        DaynaPort::new(mock.clone(), ScsiMode::DaynaPort)
    }

    fn entry(ssid: &str, rssi: i8) -> NetworkEntry {
        let mut e = NetworkEntry {
            bssid: [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff],
            rssi,
            channel: 6,
            flags: 1,
            ..NetworkEntry::default()
        };
        e.ssid.push_str(ssid).unwrap();
        e
    }

    #[test]
    fn inquiry_accepts_target_identity() {
        let mock = MockTransport::new();
        let identity = port(&mock).inquire().unwrap();
        assert_eq!(identity.vendor, "Dayna");
        assert_eq!(identity.product, "SCSI/Link");
        assert_eq!(mock.commands()[0], [0x12, 0, 0, 0, 0x40, 0]);
    }

    #[test]
    fn inquiry_match_ignores_case() {
        let mock = MockTransport::new();
        mock.state().set_identity("DAYNA", "scsi/link");
        assert!(port(&mock).inquire().is_ok());
    }

    #[test]
    fn inquiry_rejects_other_devices() {
        let mock = MockTransport::new();
        mock.state().set_identity("SEAGATE", "ST32550N");
        let err = port(&mock).inquire().unwrap_err();
        assert!(matches!(err, CommandError::NotTargetDevice(_)));
    }

    #[test]
    fn inquiry_rejects_short_response() {
        let mock = MockTransport::new();
        mock.state().inquiry_len = Some(20);
        let err = port(&mock).inquire().unwrap_err();
        assert!(matches!(err, CommandError::NotTargetDevice(_)));
    }

    #[test]
    fn status_failure_carries_sense() {
        let mock = MockTransport::new();
        mock.state().fail_opcode = Some((0x12, vec![0x70, 0, 0x05]));
        let err = port(&mock).inquire().unwrap_err();
        assert_eq!(err.sense(), &[0x70, 0, 0x05]);
    }

    #[test]
    fn mac_address_requires_six_bytes() {
        let mock = MockTransport::new();
        let mac = port(&mock).mac_address().unwrap();
        assert_eq!(mac, mock.state().mac);

        mock.state().mac_len = 4;
        assert!(matches!(
            port(&mock).mac_address(),
            Err(CommandError::UnexpectedLength { actual: 4, .. })
        ));
    }

    #[test]
    fn scan_start_and_poll() {
        let mock = MockTransport::new();
        let mut port = port(&mock);
        assert_eq!(port.scan().unwrap(), ScanStatus::Busy);
        assert_eq!(port.scan_status().unwrap(), ScanStatus::Busy);
        assert_eq!(port.scan_status().unwrap(), ScanStatus::Complete);
    }

    #[test]
    fn scan_status_unknown_reply_means_not_running() {
        let mock = MockTransport::new();
        assert_eq!(port(&mock).scan_status().unwrap(), ScanStatus::NotRunning);
    }

    #[test]
    fn scan_results_are_capped() {
        let mock = MockTransport::new();
        mock.state().scan_results = (0..12).map(|i| entry(&format!("net{i}"), -40)).collect();
        let results = port(&mock).scan_results().unwrap();
        assert_eq!(results.len(), MAX_NETWORK_COUNT);
        assert_eq!(results[0].ssid(), "net0");
        assert_eq!(results[9].channel, 6);
    }

    #[test]
    fn scan_results_ignore_partial_records() {
        let mock = MockTransport::new();
        mock.state().scan_results = vec![entry("one", -50), entry("two", -60)];
        mock.state().scan_results_len_override = Some(NETWORK_ENTRY_LEN * 2 - 1);
        let results = port(&mock).scan_results().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].ssid(), "one");
    }

    #[test]
    fn current_network_when_connected() {
        let mock = MockTransport::new();
        mock.state().network = Some(entry("home", -55));
        let network = port(&mock).current_network().unwrap();
        assert_eq!(network.ssid(), "home");
        assert_eq!(network.rssi, -55);
        assert!(network.is_connected());
    }

    #[test]
    fn current_network_zero_signal_is_not_connected() {
        let mock = MockTransport::new();
        mock.state().network = Some(entry("home", 0));
        assert_eq!(port(&mock).current_network().unwrap(), NetworkEntry::default());

        mock.state().network = None;
        assert!(!port(&mock).current_network().unwrap().is_connected());
    }

    #[test]
    fn join_lays_out_ssid_and_key() {
        let mock = MockTransport::new();
        port(&mock).join_network("lab", "secret").unwrap();
        assert_eq!(mock.state().joins, vec![("lab".to_string(), "secret".to_string())]);
        assert_eq!(mock.commands()[0], [0x1c, 0x05, 0, 0, 0x82, 0]);
    }

    #[test]
    fn enable_is_idempotent() {
        let mock = MockTransport::new();
        let mut port = port(&mock);
        port.enable(true).unwrap();
        port.enable(true).unwrap();
        port.enable(false).unwrap();
        assert_eq!(mock.commands()[0], [0x0e, 0, 0, 0, 0, 0x80]);
        assert_eq!(mock.commands()[2], [0x0e, 0, 0, 0, 0, 0]);
        assert!(!mock.state().enabled);
    }

    #[test]
    fn add_multicast_sends_address() {
        let mock = MockTransport::new();
        let addr = EthernetAddress([0x01, 0x00, 0x5e, 0, 0, 1]);
        port(&mock).add_multicast(addr).unwrap();
        assert_eq!(mock.state().multicast, vec![addr]);
        assert_eq!(mock.commands()[0], [0x0d, 0, 0, 6, 0, 0]);
    }

    #[test]
    fn send_frame_encodes_length() {
        let mock = MockTransport::new();
        port(&mock).send_frame(&[0u8; 0x123]).unwrap();
        assert_eq!(mock.commands()[0], [0x0a, 0, 0, 0x01, 0x23, 0]);
        assert_eq!(mock.sent_frames().len(), 1);
    }

    #[test]
    fn receive_encoding_follows_mode() {
        let cases = [
            (ScsiMode::DaynaPort, [0x08, 0, 0, 0x05, 0xf6, 0]),
            (ScsiMode::ScsiDevice, [0x1c, 0x08, 0xa8, 0x05, 0xf6, 0]),
            (ScsiMode::SingleWrite, [0x1c, 0x08, 0xa9, 0x05, 0xf6, 0]),
        ];
        for (mode, expected) in cases {
            let mock = MockTransport::new();
            let mut port = DaynaPort::new(mock.clone(), mode);
            let mut buf = [0u8; RECEIVE_BUFFER_SIZE];
            assert_eq!(port.receive_frame(&mut buf).unwrap(), 6);
            assert_eq!(mock.commands()[0], expected, "{mode:?}");
        }
    }

    #[test]
    fn receive_shorter_than_prefix_fails() {
        let mock = MockTransport::new();
        mock.state().receive_len_override = Some(3);
        let mut buf = [0u8; RECEIVE_BUFFER_SIZE];
        assert!(matches!(
            port(&mock).receive_frame(&mut buf),
            Err(CommandError::UnexpectedLength { actual: 3, .. })
        ));
    }

    #[test]
    fn network_entry_parse_stops_at_nul() {
        let mut record = [0u8; NETWORK_ENTRY_LEN];
        record[..4].copy_from_slice(b"cafe");
        record[70] = (-70i8) as u8;
        let entry = NetworkEntry::parse(&record);
        assert_eq!(entry.ssid(), "cafe");
        assert_eq!(entry.rssi, -70);
    }
}
