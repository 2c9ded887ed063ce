use std::time::{SystemTime, UNIX_EPOCH};

/// Abstraction over the wall clock to improve testability.
///
/// Message timestamps and the latency deadline both use wall-clock seconds
/// since the epoch, so tests can pin time without sleeping.
pub trait WallClock: Send {
    /// Returns seconds since the Unix epoch.
    fn now_secs(&self) -> u64;
}

/// System wall clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
    }
}

/// Fixed clock for tests.
#[derive(Debug)]
pub struct FixedClock(pub u64);

impl WallClock for FixedClock {
    fn now_secs(&self) -> u64 {
        self.0
    }
}
