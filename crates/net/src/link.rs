//! Link state, statistics and the connectivity monitor.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Requested and actual online flags.
///
/// Written by the worker (actual) and by clients (requested); both are
/// single-word flags read without further locking.
#[derive(Debug)]
pub struct LinkState {
    requested: AtomicBool,
    actual: AtomicBool,
}

impl LinkState {
    pub fn new(requested: bool) -> Self {
        Self {
            requested: AtomicBool::new(requested),
            actual: AtomicBool::new(false),
        }
    }

    pub fn is_online(&self) -> bool {
        self.actual.load(Ordering::Acquire)
    }

    pub fn online_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub fn request_online(&self, online: bool) {
        self.requested.store(online, Ordering::Release);
    }

    pub(crate) fn set_actual(&self, online: bool) {
        self.actual.store(online, Ordering::Release);
    }
}

/// Counters kept by the worker.
#[derive(Debug, Default)]
pub struct DeviceStats {
    packets_received: AtomicU64,
    packets_sent: AtomicU64,
    unknown_types_received: AtomicU64,
    bad_data: AtomicU64,
    /// Microseconds since the epoch of the last link up; zero if never.
    last_start_micros: AtomicU64,
}

impl DeviceStats {
    pub(crate) fn record_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unknown_type(&self) {
        self.unknown_types_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bad_data(&self) {
        self.bad_data.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn mark_started(&self, at: SystemTime) {
        let micros = at
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
            .unwrap_or(0)
            .max(1);
        self.last_start_micros.store(micros, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GlobalStats {
        let micros = self.last_start_micros.load(Ordering::Relaxed);
        GlobalStats {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            unknown_types_received: self.unknown_types_received.load(Ordering::Relaxed),
            bad_data: self.bad_data.load(Ordering::Relaxed),
            last_start: (micros != 0).then(|| UNIX_EPOCH + Duration::from_micros(micros)),
        }
    }
}

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlobalStats {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub unknown_types_received: u64,
    /// Frames dropped because their framing was inconsistent.
    pub bad_data: u64,
    pub last_start: Option<SystemTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTransition {
    Up,
    Down,
}

/// Decides when to probe connectivity and when the link changes state.
///
/// Holds no transport; the worker runs the probe and feeds the result back,
/// which keeps the state machine testable with synthetic instants.
#[derive(Debug)]
pub struct LinkMonitor {
    probe_interval: Duration,
    last_probe: Option<Instant>,
    signal: bool,
    online: bool,
}

impl LinkMonitor {
    pub fn new(probe_interval: Duration) -> Self {
        Self {
            probe_interval,
            last_probe: None,
            signal: true,
            online: false,
        }
    }

    /// The first probe is due immediately, then once per interval.
    pub fn probe_due(&self, now: Instant) -> bool {
        self.last_probe
            .is_none_or(|last| now.saturating_duration_since(last) >= self.probe_interval)
    }

    /// Record a probe. `None` means the probe itself failed and the previous
    /// signal reading stands.
    pub fn record_probe(&mut self, now: Instant, signal: Option<bool>) {
        self.last_probe = Some(now);
        match signal {
            Some(signal) => {
                if signal != self.signal {
                    info!(signal, "link signal changed");
                }
                self.signal = signal;
            }
            None => debug!(signal = self.signal, "keeping previous signal reading"),
        }
    }

    #[cfg(test)]
    pub fn has_signal(&self) -> bool {
        self.signal
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Compare the target state against the current one.
    pub fn evaluate(&mut self, requested: bool) -> Option<LinkTransition> {
        let target = requested && self.signal;
        if target == self.online {
            return None;
        }
        self.online = target;
        Some(if target {
            LinkTransition::Up
        } else {
            LinkTransition::Down
        })
    }
}
