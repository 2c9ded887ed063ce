//! The per-send admit/drop decision.
//!
//! The scheduler sits between the send path and the wire. Before each send
//! it compares the measured outbound rate against the configured limit and
//! either admits the packet or drops it, counting both outcomes. Dropping
//! is silent toward the network; local bookkeeping (the modified set having
//! been consumed, merges already applied) is never rolled back.

use tracing::debug;

use crate::bandwidth::BandwidthMonitor;

/// Decides, per packet, whether the send path may put bytes on the wire.
pub struct PacketScheduler {
    limit: u64,
    admitted: u64,
    dropped: u64,
}

impl PacketScheduler {
    /// Creates a scheduler enforcing `limit` bytes/sec (0 = unlimited).
    pub fn new(limit: u64) -> Self {
        Self { limit, admitted: 0, dropped: 0 }
    }

    /// Checks the monitor against the limit and records the outcome.
    /// Returns whether the packet may be sent.
    pub fn try_admit(&mut self, monitor: &BandwidthMonitor) -> bool {
        if monitor.is_violated(self.limit) {
            self.dropped += 1;
            debug!(
                limit = self.limit,
                rate = monitor.bytes_per_second(),
                dropped = self.dropped,
                "send bandwidth limit exceeded, dropping packet"
            );
            false
        } else {
            self.admitted += 1;
            true
        }
    }

    /// Number of packets admitted so far.
    pub fn admitted(&self) -> u64 {
        self.admitted
    }

    /// Number of packets dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_unlimited_always_admits() {
        let monitor = BandwidthMonitor::new(Duration::from_secs(1));
        monitor.add(1_000_000);

        let mut scheduler = PacketScheduler::new(0);
        assert!(scheduler.try_admit(&monitor));
        assert_eq!(scheduler.admitted(), 1);
        assert_eq!(scheduler.dropped(), 0);
    }

    #[test]
    fn test_drops_over_limit() {
        let monitor = BandwidthMonitor::new(Duration::from_secs(1));
        monitor.add(50_000);

        let mut scheduler = PacketScheduler::new(10_000);
        assert!(!scheduler.try_admit(&monitor));
        assert_eq!(scheduler.dropped(), 1);
    }

    #[test]
    fn test_admits_under_limit() {
        let monitor = BandwidthMonitor::new(Duration::from_secs(1));
        monitor.add(5_000);

        let mut scheduler = PacketScheduler::new(10_000);
        assert!(scheduler.try_admit(&monitor));
        assert!(scheduler.try_admit(&monitor));
        assert_eq!(scheduler.admitted(), 2);
    }
}
