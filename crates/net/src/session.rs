//! Session establishment and the worker's lifetime.

use crate::command::{DaynaPort, DeviceIdentity};
use crate::config::BridgeConfig;
use crate::device::BridgeHandle;
use crate::error::CommandError;
use crate::transport::ScsiTransport;
use crate::worker::{Shared, Worker};
use daynalink_core::{Error, Result, Settings};
use smoltcp::wire::EthernetAddress;
use std::io;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Device indices tried, in order, when none is configured.
pub const AUTO_DETECT_ORDER: [u8; 8] = [4, 5, 6, 7, 0, 1, 2, 3];

const WORKER_THREAD_NAME: &str = "daynalink-worker";

/// An identified adapter, not yet handed to a worker.
pub struct Session<T> {
    port: DaynaPort<T>,
    identity: DeviceIdentity,
    station_address: EthernetAddress,
    device_id: u8,
}

impl<T: ScsiTransport> Session<T> {
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn station_address(&self) -> EthernetAddress {
        self.station_address
    }

    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    /// Direct command access for tools that never start a worker.
    pub fn port_mut(&mut self) -> &mut DaynaPort<T> {
        &mut self.port
    }
}

/// Find and identify the adapter.
///
/// `open` turns a device path into a transport. With no configured index
/// every index in [`AUTO_DETECT_ORDER`] is tried and the first device that
/// identifies as the adapter wins.
pub fn open_device<T, F>(settings: &Settings, mut open: F) -> Result<Session<T>>
where
    T: ScsiTransport,
    F: FnMut(&str) -> io::Result<T>,
{
    let candidates = match settings.device_id {
        Some(id) => vec![id],
        None => AUTO_DETECT_ORDER.to_vec(),
    };

    let mut failure: Option<Error> = None;
    for device_id in candidates {
        let path = settings.device_path(device_id);
        let transport = match open(&path) {
            Ok(transport) => transport,
            Err(source) => {
                debug!(%path, error = %source, "cannot open device");
                // A device that answered says more than one that didn't open.
                if !matches!(failure, Some(Error::InquiryFailed | Error::NotTargetDevice)) {
                    failure = Some(Error::DeviceOpenFailed { path, source });
                }
                continue;
            }
        };

        let mut port = DaynaPort::new(transport, settings.scsi_mode);
        match port.inquire() {
            Ok(identity) => {
                info!(%path, %identity, "found adapter");
                return finish_open(port, identity, device_id, settings);
            }
            Err(CommandError::NotTargetDevice(found)) => {
                debug!(%path, %found, "not an adapter");
                failure = Some(Error::NotTargetDevice);
            }
            Err(e) => {
                debug!(%path, error = %e, "inquiry failed");
                failure = Some(Error::InquiryFailed);
            }
        }
    }

    Err(failure.unwrap_or(Error::NotTargetDevice))
}

fn finish_open<T: ScsiTransport>(
    mut port: DaynaPort<T>,
    identity: DeviceIdentity,
    device_id: u8,
    settings: &Settings,
) -> Result<Session<T>> {
    let station_address = port.mac_address().map_err(|e| {
        warn!(error = %e, "failed to read MAC address");
        Error::MacAddressUnavailable
    })?;
    info!(%station_address, "adapter address");

    if settings.auto_connect && !settings.ssid.is_empty() {
        auto_connect(&mut port, settings);
    }

    Ok(Session {
        port,
        identity,
        station_address,
        device_id,
    })
}

/// Join the configured network unless the adapter is already on it.
fn auto_connect<T: ScsiTransport>(port: &mut DaynaPort<T>, settings: &Settings) {
    match port.current_network() {
        Ok(network) if network.ssid() == settings.ssid => {
            info!(ssid = %settings.ssid, "already connected");
            return;
        }
        Ok(_) => {}
        Err(e) => debug!(error = %e, "could not read current network"),
    }

    match port.join_network(&settings.ssid, &settings.key) {
        Ok(()) => info!(ssid = %settings.ssid, "join requested"),
        Err(e) => warn!(ssid = %settings.ssid, error = %e, "join request rejected"),
    }
}

/// A running bridge session.
///
/// Dropping it asks the worker to stop; [`Bridge::shutdown`] also waits for
/// the worker to finish draining its queues.
pub struct Bridge {
    handle: BridgeHandle,
    shared: Arc<Shared>,
    exited: Option<oneshot::Receiver<()>>,
}

impl Bridge {
    /// Find the adapter and start the worker.
    pub fn open<T, F>(settings: &Settings, config: BridgeConfig, open: F) -> Result<Self>
    where
        T: ScsiTransport,
        F: FnMut(&str) -> io::Result<T>,
    {
        settings.validate()?;
        let session = open_device(settings, open)?;
        Self::start(session, settings, config)
    }

    /// Hand the session's transport to a new worker thread.
    pub fn start<T: ScsiTransport>(
        session: Session<T>,
        settings: &Settings,
        config: BridgeConfig,
    ) -> Result<Self> {
        let shared = Arc::new(Shared::new(session.station_address, config.start_online));
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| Error::OutOfMemory(format!("worker runtime: {e}")))?;

        let worker = Worker::new(session.port, shared.clone(), config);
        let priority = settings.task_priority;
        let (exit_tx, exit_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                apply_priority(priority);
                runtime.block_on(worker.run());
                let _ = exit_tx.send(());
            })
            .map_err(|e| Error::OutOfMemory(format!("worker thread: {e}")))?;

        info!(device_id = session.device_id, "bridge started");
        Ok(Self {
            handle: BridgeHandle::new(shared.clone()),
            shared,
            exited: Some(exit_rx),
        })
    }

    pub fn handle(&self) -> BridgeHandle {
        self.handle.clone()
    }

    /// Stop the worker and wait until it has taken the link down.
    pub async fn shutdown(mut self) -> Result<()> {
        self.shared.signals.request_terminate();
        match self.exited.take() {
            Some(exited) => exited.await.map_err(|_| Error::WorkerExited),
            None => Ok(()),
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shared.signals.request_terminate();
    }
}

/// Map a task priority onto the worker thread's niceness. Best effort:
/// raising priority usually needs privileges.
#[cfg(target_os = "linux")]
fn apply_priority(priority: i8) {
    if priority == 0 {
        return;
    }
    let nice = (-i32::from(priority)).clamp(-20, 19);
    // SAFETY: both calls only read their integer arguments.
    let rc = unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, nice)
    };
    if rc != 0 {
        debug!(priority, nice, error = %io::Error::last_os_error(), "could not adjust worker priority");
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_priority(_priority: i8) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;

    type Tried = Arc<std::sync::Mutex<Vec<String>>>;

    /// Opener that only finds an adapter at `index`, recording every path tried.
    fn opener_at(
        index: u8,
        mock: &MockTransport,
    ) -> (impl FnMut(&str) -> io::Result<MockTransport>, Tried) {
        let target = format!("/dev/sg{index}");
        let mock = mock.clone();
        let tried = Tried::default();
        let log = tried.clone();
        let open = move |path: &str| {
            log.lock().unwrap().push(path.to_string());
            if path == target {
                Ok(mock.clone())
            } else {
                Err(io::Error::new(io::ErrorKind::NotFound, "no such device"))
            }
        };
        (open, tried)
    }

    #[test]
    fn auto_detect_tries_high_indices_first() {
        let mock = MockTransport::new();
        let (open, tried) = opener_at(6, &mock);
        let session = open_device(&Settings::default(), open).unwrap();

        assert_eq!(*tried.lock().unwrap(), ["/dev/sg4", "/dev/sg5", "/dev/sg6"]);
        assert_eq!(session.device_id(), 6);
        assert_eq!(session.station_address(), mock.state().mac);
        assert_eq!(session.identity().product, "SCSI/Link");
    }

    #[test]
    fn configured_index_is_the_only_candidate() {
        let mock = MockTransport::new();
        let (open, tried) = opener_at(6, &mock);
        let settings = Settings {
            device_id: Some(2),
            ..Settings::default()
        };
        let err = open_device(&settings, open).err().unwrap();
        assert!(matches!(err, Error::DeviceOpenFailed { ref path, .. } if path == "/dev/sg2"));
        assert_eq!(*tried.lock().unwrap(), ["/dev/sg2"]);
    }

    #[test]
    fn foreign_device_is_not_target() {
        let mock = MockTransport::new();
        mock.state().set_identity("QUANTUM", "FIREBALL");
        let (open, tried) = opener_at(0, &mock);
        let err = open_device(&Settings::default(), open).err().unwrap();
        assert!(matches!(err, Error::NotTargetDevice));
        assert_eq!(tried.lock().unwrap().len(), 8);
    }

    #[test]
    fn failed_inquiry_is_reported() {
        let mock = MockTransport::new();
        mock.state().fail_opcode = Some((0x12, Vec::new()));
        let settings = Settings {
            device_id: Some(4),
            ..Settings::default()
        };
        let err = open_device(&settings, opener_at(4, &mock).0).err().unwrap();
        assert!(matches!(err, Error::InquiryFailed));
    }

    #[test]
    fn missing_mac_is_fatal() {
        let mock = MockTransport::new();
        mock.state().mac_len = 0;
        let err = open_device(&Settings::default(), opener_at(4, &mock).0)
            .err()
            .unwrap();
        assert!(matches!(err, Error::MacAddressUnavailable));
    }

    #[test]
    fn auto_connect_joins_other_network() {
        let mock = MockTransport::new();
        let settings = Settings {
            auto_connect: true,
            ssid: "office".to_string(),
            key: "pass".to_string(),
            ..Settings::default()
        };
        open_device(&settings, opener_at(4, &mock).0).unwrap();
        assert_eq!(mock.state().joins, vec![("office".to_string(), "pass".to_string())]);
    }

    #[test]
    fn auto_connect_skips_current_network() {
        let mock = MockTransport::new();
        let settings = Settings {
            auto_connect: true,
            ssid: "mocknet".to_string(),
            ..Settings::default()
        };
        open_device(&settings, opener_at(4, &mock).0).unwrap();
        assert!(mock.state().joins.is_empty());
    }

    #[test]
    fn no_join_without_auto_connect() {
        let mock = MockTransport::new();
        let settings = Settings {
            ssid: "office".to_string(),
            ..Settings::default()
        };
        open_device(&settings, opener_at(4, &mock).0).unwrap();
        assert!(mock.state().joins.is_empty());
    }
}
