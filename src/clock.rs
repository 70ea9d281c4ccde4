//! Frame clock.
//!
//! Refresh callbacks deliver a monotonically increasing timestamp in
//! nanoseconds. [`FrameClock`] turns it into elapsed seconds since the clock was
//! constructed, the only time value the driver feeds into animation and spin.

use std::sync::OnceLock;

use instant::Instant;

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Elapsed-time source for the frame driver.
///
/// The start timestamp is fixed at construction. Elapsed seconds never go
/// negative and never go backwards, even if the host hands us a timestamp from
/// before `start` or out of order.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start_nanos: u64,
    latest_nanos: u64,
}

impl FrameClock {
    pub fn new(start_nanos: u64) -> Self {
        Self {
            start_nanos,
            latest_nanos: start_nanos,
        }
    }

    /// A clock started now, on the [`monotonic_nanos`] timebase.
    pub fn starting_now() -> Self {
        Self::new(monotonic_nanos())
    }

    pub fn start_nanos(&self) -> u64 {
        self.start_nanos
    }

    /// Seconds between `start` and `current_nanos`, clamped to be non-negative
    /// and non-decreasing across calls.
    pub fn elapsed_seconds(&mut self, current_nanos: u64) -> f64 {
        self.latest_nanos = self.latest_nanos.max(current_nanos);
        (self.latest_nanos - self.start_nanos) as f64 / NANOS_PER_SECOND
    }
}

/// Nanoseconds on a process-wide monotonic timebase.
///
/// The epoch is the first call; refresh timestamps handed to the driver by the
/// winit host use the same timebase.
pub fn monotonic_nanos() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_seconds_since_start() {
        let mut clock = FrameClock::new(2_000_000_000);
        assert_eq!(clock.elapsed_seconds(2_000_000_000), 0.0);
        assert_eq!(clock.elapsed_seconds(3_500_000_000), 1.5);
    }

    #[test]
    fn time_never_runs_backwards() {
        let mut clock = FrameClock::new(1_000);
        assert_eq!(clock.elapsed_seconds(0), 0.0);
        let later = clock.elapsed_seconds(1_000_001_000);
        assert_eq!(clock.elapsed_seconds(500_000_000), later);
    }

    #[test]
    fn monotonic_nanos_is_monotonic() {
        let a = monotonic_nanos();
        let b = monotonic_nanos();
        assert!(b >= a);
    }
}
