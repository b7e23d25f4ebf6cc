//! Time source abstraction.
//!
//! All session timestamps are Unix epoch milliseconds obtained from a
//! [`Clock`]. Services hold an `Arc<dyn Clock>` rather than calling
//! `SystemTime::now()` directly.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Source of "now" for session bookkeeping.
pub trait Clock: Send + Sync {
    /// Current time in Unix epoch milliseconds.
    fn now_millis(&self) -> u64;
}

/// Wall clock sampled once, then advanced by tokio's monotonic clock.
///
/// Readings never jump when the system clock is stepped and follow tokio's
/// paused time under `test-util`.
pub struct SystemClock {
    base_millis: u64,
    base_instant: Instant,
}

impl SystemClock {
    /// Creates a clock anchored at the current wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_millis: now_millis(),
            base_instant: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.base_millis + self.base_instant.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn system_clock_follows_tokio_time() {
        let clock = SystemClock::new();
        let before = clock.now_millis();

        tokio::time::advance(Duration::from_secs(90)).await;

        assert_eq!(clock.now_millis() - before, 90_000);
    }

    #[test]
    fn now_millis_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }
}
