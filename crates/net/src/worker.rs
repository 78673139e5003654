//! The bridge worker: the only owner of the transport.
//!
//! Each cycle probes connectivity when due, drains inbound frames into
//! waiting readers, sends a bounded batch of queued writes and then sleeps
//! for an interval chosen from how much traffic moved.

use crate::command::{DaynaPort, PACKET_MAX_SIZE, RECEIVE_BUFFER_SIZE};
use crate::config::BridgeConfig;
use crate::frame::{self, LinkHeader, PREFIX_LEN, ReceivedFrame, prepare_outgoing};
use crate::link::{DeviceStats, LinkMonitor, LinkState, LinkTransition};
use crate::queue::{Pending, Queues};
use crate::request::{EventMask, IoError, IoFlags, RequestId, WireError};
use crate::scheduler::{Cadence, Signals};
use crate::transport::ScsiTransport;
use smoltcp::wire::EthernetAddress;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Instant, SystemTime};
use tracing::{debug, info, trace, warn};

/// Session state shared by the worker and every client handle.
pub(crate) struct Shared {
    pub link: LinkState,
    pub stats: DeviceStats,
    pub queues: Queues,
    pub signals: Signals,
    pub station_address: EthernetAddress,
    next_id: AtomicU64,
    /// Set once the worker has drained its queues for the last time.
    closed: AtomicBool,
}

impl Shared {
    pub fn new(station_address: EthernetAddress, start_online: bool) -> Self {
        Self {
            link: LinkState::new(start_online),
            stats: DeviceStats::default(),
            queues: Queues::new(),
            signals: Signals::new(),
            station_address,
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// No worker will complete anything queued from now on.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn next_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Complete every subscription interested in `event`.
    pub fn emit(&self, event: EventMask) {
        let matched = self
            .queues
            .event
            .take_matching(|request| request.events.intersects(event));
        trace!(?event, subscribers = matched.len(), "event");
        for mut pending in matched {
            let request = pending.request_mut();
            request.events &= event;
            request.succeed();
            pending.complete();
        }
    }

    /// Route one non-empty read to a typed reader or the orphan queue.
    ///
    /// Returns whether a request took the frame.
    fn deliver(&self, wire: &[u8]) -> bool {
        let frame = match ReceivedFrame::parse(wire) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, len = wire.len(), "dropping malformed frame");
                self.stats.record_bad_data();
                return false;
            }
        };

        let packet_type = frame.packet_type();
        if let Some(pending) = self
            .queues
            .read
            .take_first(|request| request.packet_type == packet_type)
        {
            self.complete_read(pending, &frame);
            return true;
        }

        self.stats.record_unknown_type();
        match self.queues.orphan.pop_front() {
            Some(pending) => {
                trace!(packet_type, "orphan reader took frame");
                self.complete_read(pending, &frame);
                true
            }
            None => {
                trace!(packet_type, len = wire.len(), "no reader for frame");
                false
            }
        }
    }

    fn complete_read(&self, mut pending: Pending, frame: &ReceivedFrame<'_>) {
        let request = pending.request_mut();
        let raw = request.is_raw();
        let payload = frame.payload(raw);

        request.packet_type = frame.packet_type();
        request.src_addr = frame.src_addr();
        request.dst_addr = frame.dst_addr();
        request.data_length = payload.len();
        request.flags = if raw { IoFlags::RAW } else { IoFlags::empty() };
        if frame.is_broadcast() {
            request.flags |= IoFlags::BCAST;
        }

        let copied = request
            .buffers
            .as_mut()
            .is_some_and(|buffers| buffers.copy_to_buffer(payload));
        if copied {
            request.succeed();
        } else {
            request.fail(IoError::Software, WireError::BufferError);
        }
        pending.complete();

        if !copied {
            warn!(packet_type = frame.packet_type(), "reader rejected frame payload");
            self.emit(EventMask::ERROR | EventMask::BUFF | EventMask::SOFTWARE);
        }
    }
}

/// What one receive burst moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Burst {
    /// Non-empty frames read.
    pub frames: usize,
    /// Frames handed to a reader or orphan reader.
    pub delivered: usize,
    /// The adapter still held frames when the burst ended.
    pub more_pending: bool,
}

impl Burst {
    /// Two or more deliveries keep the fast cadence even without the
    /// more-pending flag.
    pub fn keeps_fast(&self) -> bool {
        self.more_pending || self.delivered >= 2
    }
}

pub(crate) struct Worker<T> {
    port: DaynaPort<T>,
    shared: Arc<Shared>,
    config: BridgeConfig,
    monitor: LinkMonitor,
    rx_buf: Box<[u8]>,
    tx_buf: Box<[u8]>,
}

impl<T: ScsiTransport> Worker<T> {
    pub fn new(port: DaynaPort<T>, shared: Arc<Shared>, config: BridgeConfig) -> Self {
        Self {
            monitor: LinkMonitor::new(config.probe_interval),
            port,
            shared,
            config,
            rx_buf: vec![0; RECEIVE_BUFFER_SIZE].into_boxed_slice(),
            tx_buf: vec![0; PACKET_MAX_SIZE].into_boxed_slice(),
        }
    }

    pub async fn run(mut self) {
        info!(mode = ?self.port.mode(), "bridge worker started");
        while !self.shared.signals.terminate_requested() {
            let cadence = self.cycle(Instant::now());
            let wake = self
                .shared
                .signals
                .wait(cadence.interval(&self.config))
                .await;
            if wake.terminate {
                break;
            }
        }
        self.shutdown();
    }

    /// One pass of the pipeline. Returns the cadence for the next wait.
    pub fn cycle(&mut self, now: Instant) -> Cadence {
        self.service_link(now);
        if !self.monitor.is_online() {
            return Cadence::Slow;
        }

        let burst = self.receive_burst();
        if self.shared.signals.terminate_requested() {
            return Cadence::Slow;
        }
        let sent = self.transmit_batch();
        Cadence::select(true, burst.keeps_fast() || sent > 0)
    }

    pub fn service_link(&mut self, now: Instant) {
        if self.monitor.probe_due(now) {
            let signal = match self.port.current_network() {
                Ok(network) => {
                    if network.is_connected() {
                        trace!(ssid = network.ssid(), rssi = network.rssi, "wifi connected");
                    } else {
                        debug!("wifi not connected");
                    }
                    Some(network.is_connected())
                }
                Err(e) => {
                    warn!(error = %e, "connectivity probe failed");
                    None
                }
            };
            self.monitor.record_probe(now, signal);
        }

        if let Some(transition) = self.monitor.evaluate(self.shared.link.online_requested()) {
            self.apply_transition(transition);
        }
    }

    fn apply_transition(&mut self, transition: LinkTransition) {
        let up = transition == LinkTransition::Up;
        if let Err(e) = self.port.enable(up) {
            warn!(error = %e, up, "failed to switch adapter receive state");
        }

        match transition {
            LinkTransition::Up => {
                self.shared.stats.mark_started(SystemTime::now());
                self.shared.link.set_actual(true);
                info!("link online");
                self.shared.emit(EventMask::ONLINE);
            }
            LinkTransition::Down => {
                self.shared.link.set_actual(false);
                let flushed = self.shared.queues.flush_offline();
                info!(flushed, "link offline");
                self.shared.emit(EventMask::OFFLINE);
            }
        }
    }

    /// Read frames until the adapter runs dry or a signal arrives.
    pub fn receive_burst(&mut self) -> Burst {
        let mut burst = Burst::default();
        loop {
            let more = match self.port.receive_frame(&mut self.rx_buf) {
                Ok(len) => {
                    let wire = &self.rx_buf[..len];
                    if len > PREFIX_LEN {
                        burst.frames += 1;
                        self.shared.stats.record_received();
                        if self.shared.deliver(wire) {
                            burst.delivered += 1;
                        }
                    }
                    frame::more_pending(wire)
                }
                Err(e) => {
                    warn!(error = %e, "frame receive failed");
                    self.shared
                        .emit(EventMask::ERROR | EventMask::HARDWARE | EventMask::RX);
                    false
                }
            };
            burst.more_pending = more;

            // A consumed write signal is served by the batch that follows.
            if !more || self.shared.signals.take().any() {
                break;
            }
        }
        if burst.frames > 0 {
            trace!(?burst, "receive burst");
        }
        burst
    }

    /// Send up to one batch of queued writes. Returns how many were taken.
    pub fn transmit_batch(&mut self) -> usize {
        let batch = self.shared.queues.write.drain_up_to(self.config.write_batch);
        let count = batch.len();
        for pending in batch {
            self.transmit(pending);
        }
        count
    }

    fn transmit(&mut self, mut pending: Pending) {
        let request = pending.request_mut();
        let raw = request.is_raw();
        let payload_len = request.data_length;

        if raw && payload_len == 0 {
            trace!(id = request.id(), "empty raw write");
            request.succeed();
            pending.complete();
            return;
        }

        let header = (!raw).then(|| LinkHeader {
            dst: request.dst_addr,
            src: self.shared.station_address,
            packet_type: request.packet_type,
        });
        let mut frame = match prepare_outgoing(&mut self.tx_buf, header.as_ref(), payload_len) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "write does not fit a frame");
                request.fail(IoError::BadArgument, WireError::MtuExceeded);
                pending.complete();
                return;
            }
        };

        let copied = request
            .buffers
            .as_mut()
            .is_some_and(|buffers| buffers.copy_from_buffer(frame.payload_mut()));
        if !copied {
            request.fail(IoError::Software, WireError::BufferError);
            pending.complete();
            warn!("writer rejected payload copy");
            self.shared
                .emit(EventMask::ERROR | EventMask::BUFF | EventMask::SOFTWARE);
            return;
        }

        match self.port.send_frame(frame.as_bytes()) {
            Ok(()) => {
                trace!(len = frame.len(), packet_type = request.packet_type, raw, "frame sent");
                self.shared.stats.record_sent();
                request.succeed();
                pending.complete();
            }
            Err(e) => {
                warn!(error = %e, len = frame.len(), "frame send failed");
                request.fail(IoError::TxFailure, WireError::Generic);
                pending.complete();
                self.shared
                    .emit(EventMask::ERROR | EventMask::TX | EventMask::HARDWARE);
            }
        }
    }

    /// Take the link down for good and complete everything still queued.
    pub fn shutdown(mut self) {
        info!("bridge worker shutting down");
        self.shared.link.set_actual(false);
        if let Err(e) = self.port.enable(false) {
            warn!(error = %e, "failed to disable adapter");
        }
        self.shared.emit(EventMask::OFFLINE);
        let flushed = self.shared.queues.flush_offline();
        // Subscriptions are admitted under the event lock only while open,
        // so closing first leaves nothing behind the drain.
        self.shared.close();
        let subscribers = self
            .shared
            .queues
            .event
            .fail_all(IoError::OutOfService, WireError::UnitOffline);
        debug!(flushed, subscribers, "queues drained");
    }
}
