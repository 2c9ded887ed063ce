//! Sliding-window bandwidth measurement.
//!
//! One monitor tracks one direction of traffic. Samples older than the
//! window are discarded on every query, so the reported rate always covers
//! the most recent window only.

use std::{
    collections::VecDeque,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Measures the byte rate over a fixed sliding window.
pub struct BandwidthMonitor {
    window: Duration,
    samples: Mutex<VecDeque<(Instant, u64)>>,
}

impl BandwidthMonitor {
    /// Creates a monitor covering the given window.
    pub fn new(window: Duration) -> Self {
        Self { window, samples: Mutex::new(VecDeque::new()) }
    }

    /// Records `bytes` as transferred now.
    pub fn add(&self, bytes: u64) {
        self.add_at(Instant::now(), bytes);
    }

    /// Records `bytes` as transferred at an explicit instant.
    pub fn add_at(&self, at: Instant, bytes: u64) {
        let mut samples = lock(&self.samples);
        samples.push_back((at, bytes));
    }

    /// Returns the byte rate over the window, in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        let total = self.window_total(Instant::now());
        total as f64 / self.window.as_secs_f64()
    }

    /// Checks the current rate against a limit. A zero limit never violates.
    pub fn is_violated(&self, limit: u64) -> bool {
        limit > 0 && self.bytes_per_second() > limit as f64
    }

    /// Sums the samples still inside the window, discarding the rest.
    fn window_total(&self, now: Instant) -> u64 {
        let mut samples = lock(&self.samples);
        while let Some(&(at, _)) = samples.front() {
            if now.duration_since(at) > self.window {
                samples.pop_front();
            } else {
                break;
            }
        }
        samples.iter().map(|&(_, bytes)| bytes).sum()
    }
}

fn lock(samples: &Mutex<VecDeque<(Instant, u64)>>) -> std::sync::MutexGuard<'_, VecDeque<(Instant, u64)>> {
    samples.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_over_window() {
        let monitor = BandwidthMonitor::new(Duration::from_secs(10));
        monitor.add(500);
        monitor.add(500);
        // 1000 bytes over a 10 second window.
        assert!((monitor.bytes_per_second() - 100.0).abs() < 1.0);
    }

    #[test]
    fn test_old_samples_expire() {
        let monitor = BandwidthMonitor::new(Duration::from_secs(10));
        let stale = Instant::now() - Duration::from_secs(30);
        monitor.add_at(stale, 10_000);
        monitor.add(200);

        // Only the fresh sample counts.
        assert!((monitor.bytes_per_second() - 20.0).abs() < 1.0);
    }

    #[test]
    fn test_zero_limit_never_violates() {
        let monitor = BandwidthMonitor::new(Duration::from_secs(1));
        monitor.add(u64::MAX / 2);
        assert!(!monitor.is_violated(0));
    }

    #[test]
    fn test_limit_violation() {
        let monitor = BandwidthMonitor::new(Duration::from_secs(1));
        monitor.add(50_000);
        assert!(monitor.is_violated(10_000));
        assert!(!monitor.is_violated(100_000));
    }

    #[test]
    fn test_empty_monitor_reports_zero() {
        let monitor = BandwidthMonitor::new(Duration::from_secs(5));
        assert_eq!(monitor.bytes_per_second(), 0.0);
        assert!(!monitor.is_violated(1));
    }
}
