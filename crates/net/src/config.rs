use std::time::Duration;

/// Engine tunables. Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Time between connectivity probes.
    pub probe_interval: Duration,
    /// Wait after a cycle that moved traffic.
    pub fast_interval: Duration,
    /// Wait after an idle cycle while online.
    pub medium_interval: Duration,
    /// Wait while offline.
    pub slow_interval: Duration,
    /// Writes sent per cycle.
    pub write_batch: usize,
    /// Whether the link starts out requested online.
    pub start_online: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(5),
            fast_interval: Duration::from_millis(1),
            medium_interval: Duration::from_millis(10),
            slow_interval: Duration::from_millis(250),
            write_batch: 8,
            start_online: true,
        }
    }
}
