use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Boxed sleep future returned by [`Clock::sleep`]
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Time source for the throttler
///
/// All refill arithmetic is done against `now()`, and the drain loop waits
/// through `sleep()`, so swapping the clock swaps the whole notion of time.
pub trait Clock: Send + Sync {
    /// Monotonic time elapsed since the clock's epoch
    fn now(&self) -> Duration;

    /// Wait for `duration` of this clock's time to pass
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// Clock backed by tokio's timer
///
/// Uses `tokio::time::Instant` rather than `std::time::Instant` so a paused
/// runtime (`#[tokio::test(start_paused = true)]`) auto-advances it.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    /// Epoch for relative time measurements
    epoch: Instant,
}

impl TokioClock {
    /// Create a new clock with the current instant as epoch
    #[inline(always)]
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    #[inline(always)]
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Virtual clock that only moves when told to
///
/// `sleep` advances the clock by the requested duration and yields once to
/// the scheduler, so a drain loop driven by this clock runs in simulated
/// time at full speed. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `duration`
    pub fn advance(&self, duration: Duration) {
        self.nanos.fetch_add(duration_to_nanos(duration), Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        let nanos = Arc::clone(&self.nanos);
        Box::pin(async move {
            nanos.fetch_add(duration_to_nanos(duration), Ordering::AcqRel);
            tokio::task::yield_now().await;
        })
    }
}

/// Convert a duration to fractional milliseconds
#[inline(always)]
pub(crate) fn duration_to_millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

/// Convert fractional milliseconds to a duration, rounding up to the next nanosecond
#[inline(always)]
pub(crate) fn millis_to_duration(millis: f64) -> Duration {
    if millis <= 0.0 || !millis.is_finite() {
        return Duration::ZERO;
    }
    Duration::from_nanos((millis * 1_000_000.0).ceil() as u64)
}

#[inline(always)]
fn duration_to_nanos(duration: Duration) -> u64 {
    duration.as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        let t1 = clock.now();
        clock.sleep(Duration::from_millis(10)).await;
        let t2 = clock.now();

        assert!(t2 - t1 >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);

        clock.sleep(Duration::from_millis(3)).await;
        assert_eq!(clock.now(), Duration::from_millis(3));

        clock.advance(Duration::from_micros(500));
        assert_eq!(clock.now(), Duration::from_micros(3_500));
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_secs(1));

        assert_eq!(other.now(), Duration::from_secs(1));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(duration_to_millis(Duration::from_secs(1)), 1_000.0);
        assert_eq!(duration_to_millis(Duration::from_micros(1_500)), 1.5);
        assert_eq!(millis_to_duration(1.0), Duration::from_millis(1));
        assert_eq!(millis_to_duration(0.0), Duration::ZERO);
        assert_eq!(millis_to_duration(-4.0), Duration::ZERO);
        assert_eq!(millis_to_duration(f64::NAN), Duration::ZERO);
    }
}
