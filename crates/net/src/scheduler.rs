//! Worker wake conditions and loop cadence.

use crate::config::BridgeConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Why the worker woke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Wake {
    pub write: bool,
    pub terminate: bool,
}

impl Wake {
    pub fn any(&self) -> bool {
        self.write || self.terminate
    }
}

/// Wake conditions shared between submitters and the worker.
#[derive(Debug, Default)]
pub struct Signals {
    write: AtomicBool,
    terminate: AtomicBool,
    notify: Notify,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    /// A write was queued.
    pub fn notify_write(&self) {
        self.write.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Ask the worker to shut down. Stays set.
    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    /// Consume the write signal and read the terminate flag.
    pub fn take(&self) -> Wake {
        Wake {
            write: self.write.swap(false, Ordering::AcqRel),
            terminate: self.terminate_requested(),
        }
    }

    /// Block until `timeout` elapses or a signal arrives.
    ///
    /// Returns at once when a signal is already pending. The timer is
    /// dropped, and so cancelled, as soon as a signal wins.
    pub async fn wait(&self, timeout: Duration) -> Wake {
        let pending = self.take();
        if pending.any() {
            return pending;
        }
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {}
            _ = self.notify.notified() => {}
        }
        self.take()
    }
}

/// Wait interval class for the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Fast,
    Medium,
    Slow,
}

impl Cadence {
    pub fn select(online: bool, traffic: bool) -> Self {
        match (online, traffic) {
            (false, _) => Cadence::Slow,
            (true, true) => Cadence::Fast,
            (true, false) => Cadence::Medium,
        }
    }

    pub fn interval(self, config: &BridgeConfig) -> Duration {
        match self {
            Cadence::Fast => config.fast_interval,
            Cadence::Medium => config.medium_interval,
            Cadence::Slow => config.slow_interval,
        }
    }
}
