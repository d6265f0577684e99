//! Server timestamp source.
//!
//! All timestamps the engine persists come from here, never from per-client
//! clocks, so every observer derives deadlines from the same anchor. The
//! manual variant stands in for the real clock in tests that need to cross
//! expiration or countdown windows without sleeping.

use log::warn;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct Clock {
    inner: ClockInner,
}

#[derive(Debug, Clone)]
enum ClockInner {
    System,
    Manual(Arc<AtomicU64>),
}

impl Clock {
    /// Wall clock, milliseconds since the Unix epoch.
    pub fn system() -> Self {
        Self {
            inner: ClockInner::System,
        }
    }

    /// Fixed clock starting at `start_ms`, moved only by [`Clock::advance`].
    pub fn manual(start_ms: u64) -> Self {
        Self {
            inner: ClockInner::Manual(Arc::new(AtomicU64::new(start_ms))),
        }
    }

    pub fn now_ms(&self) -> u64 {
        match &self.inner {
            ClockInner::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::from_secs(0))
                .as_millis() as u64,
            ClockInner::Manual(ms) => ms.load(Ordering::SeqCst),
        }
    }

    /// Moves a manual clock forward. Ignored (with a warning) on the system
    /// clock.
    pub fn advance(&self, delta: Duration) {
        match &self.inner {
            ClockInner::System => warn!("advance() ignored on system clock"),
            ClockInner::Manual(ms) => {
                ms.fetch_add(delta.as_millis() as u64, Ordering::SeqCst);
            }
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_returns_epoch_millis() {
        let clock = Clock::system();
        // Any plausible "now" is far past 2020-01-01
        assert!(clock.now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_manual_clock_only_moves_when_advanced() {
        let clock = Clock::manual(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        assert_eq!(clock.now_ms(), 1_000);

        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now_ms(), 1_250);

        clock.advance(Duration::from_secs(301));
        assert_eq!(clock.now_ms(), 302_250);
    }

    #[test]
    fn test_manual_clock_is_shared_across_clones() {
        let clock = Clock::manual(0);
        let other = clock.clone();

        clock.advance(Duration::from_millis(10));
        assert_eq!(other.now_ms(), 10);
    }
}
