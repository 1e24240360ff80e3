//! Time sources for the engine and the frame loop.
//!
//! The engine itself only ever reads time from its backend; these clocks back
//! the backends that have no audio device of their own and drive the
//! per-frame tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{self, Interval, MissedTickBehavior};

/// Monotonic clock in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Clock backed by `Instant::now`, zeroed at construction.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Test-controlled clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.micros
            .fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Jump to an absolute time in seconds. Going backwards is ignored.
    pub fn set(&self, seconds: f64) {
        let target = (seconds.max(0.0) * 1_000_000.0).round() as u64;
        self.micros.fetch_max(target, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
}

/// Fixed-rate frame ticker for the realtime loop.
///
/// Late frames are skipped rather than bunched, so a stalled loop resumes at
/// the normal cadence.
pub struct FrameTicker {
    interval: Interval,
    period: Duration,
}

impl FrameTicker {
    pub fn new(frame_rate: f64) -> Self {
        let rate = if frame_rate.is_finite() && frame_rate > 0.0 {
            frame_rate
        } else {
            log::warn!(
                "[FrameTicker] Invalid frame rate {}, falling back to 60 Hz",
                frame_rate
            );
            60.0
        };
        let period = Duration::from_secs_f64(1.0 / rate);
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next frame boundary.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_shared_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance_ms(1500);
        assert!((other.now() - 1.5).abs() < 1e-9);

        other.set(1.0);
        assert!((clock.now() - 1.5).abs() < 1e-9, "set never moves backwards");
        other.set(4.25);
        assert!((clock.now() - 4.25).abs() < 1e-9);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_ticker_period() {
        let mut ticker = FrameTicker::new(50.0);
        assert_eq!(ticker.period(), Duration::from_millis(20));

        let start = tokio::time::Instant::now();
        ticker.tick().await; // first tick completes immediately
        ticker.tick().await;
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_millis(40));
    }

    #[test]
    fn test_frame_ticker_rejects_zero_rate() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let ticker = FrameTicker::new(0.0);
            assert_eq!(ticker.period(), Duration::from_secs_f64(1.0 / 60.0));
        });
    }
}
