//! Time abstraction for deterministic testing
//!
//! TigerStyle: All external I/O goes through abstraction traits.
//!
//! TTL expiry, forgetting age checks, retry backoff, and watermark timestamps
//! all read the clock through [`TimeProvider`]. The same business logic runs
//! against the wall clock in production and against [`ManualClock`] in tests,
//! where time only moves when the test advances it.
//!
//! Never call `std::time::SystemTime::now()` or `chrono::Utc::now()` from
//! service code; take a `TimeProvider` instead.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Time Provider
// ============================================================================

/// Time provider abstraction
///
/// # Implementations
///
/// - [`WallClockTime`]: production, uses the system clock
/// - [`ManualClock`]: tests, deterministic, manually advanced
#[async_trait]
pub trait TimeProvider: Send + Sync + std::fmt::Debug {
    /// Get current time in milliseconds since epoch
    fn now_ms(&self) -> u64;

    /// Sleep for the specified duration
    ///
    /// In production: actual tokio::time::sleep.
    /// Under a manual clock: advances simulated time, returns immediately.
    async fn sleep_ms(&self, ms: u64);
}

/// Production time provider using the wall clock
#[derive(Debug, Clone, Default)]
pub struct WallClockTime;

impl WallClockTime {
    /// Create a new wall clock time provider
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TimeProvider for WallClockTime {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
    }
}

/// Deterministic clock advanced by hand
///
/// `sleep_ms` advances the clock and returns immediately, so tests that
/// exercise TTLs, backoff, or forgetting run in microseconds of real time.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Create a manual clock starting at the given epoch milliseconds
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    /// Advance the clock by the given number of milliseconds
    pub fn advance_ms(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        // An arbitrary fixed epoch keeps test output stable
        Self::new(1_700_000_000_000)
    }
}

#[async_trait]
impl TimeProvider for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    async fn sleep_ms(&self, ms: u64) {
        self.advance_ms(ms);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_clock_time_now_ms() {
        let clock = WallClockTime::new();
        let now = clock.now_ms();

        // Should be a reasonable timestamp (after 2020)
        assert!(now > 1_577_836_800_000); // Jan 1, 2020

        let now2 = clock.now_ms();
        assert!(now2 >= now);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1000);
        assert_eq!(clock.now_ms(), 1000);

        clock.advance_ms(500);
        assert_eq!(clock.now_ms(), 1500);
    }

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_time() {
        let clock = ManualClock::new(0);
        clock.sleep_ms(10_000).await;
        assert_eq!(clock.now_ms(), 10_000);
    }
}
