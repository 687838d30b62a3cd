//! Frame cadence arithmetic and the clock the acquisition loop sleeps on.
//!
//! Each cycle targets `frame_period + LATENCY_OFFSET_MICROS` and sleeps for
//! whatever is left after the cycle's own work. The residual is signed: a
//! cycle that overran yields a non-positive sleep, which returns at once.
//! Overruns are not carried into later cycles.

use crate::rate::FrameRate;
use std::time::{Duration, Instant};

/// Added to every frame period. The sensor's frame-ready signal trails its
/// nominal rate by about this much.
pub const LATENCY_OFFSET_MICROS: i64 = 850;

/// Per-session timing targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    frame_period_micros: i64,
    latency_offset_micros: i64,
}

impl Cadence {
    pub fn new(rate: FrameRate) -> Self {
        Self {
            frame_period_micros: rate.frame_period_micros() as i64,
            latency_offset_micros: LATENCY_OFFSET_MICROS,
        }
    }

    pub fn frame_period_micros(&self) -> i64 {
        self.frame_period_micros
    }

    /// Full cycle budget: frame period plus latency offset.
    pub fn target_micros(&self) -> i64 {
        self.frame_period_micros + self.latency_offset_micros
    }

    /// Time left in the cycle after `elapsed` of work, truncated to whole
    /// microseconds. Negative when the cycle overran.
    pub fn residual_micros(&self, elapsed: Duration) -> i64 {
        let elapsed = i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX);
        self.target_micros().saturating_sub(elapsed)
    }
}

/// Sleep length for a signed residual; `None` means return immediately.
pub fn sleep_duration(micros: i64) -> Option<Duration> {
    if micros <= 0 {
        None
    } else {
        Some(Duration::from_micros(micros as u64))
    }
}

/// Time source for the acquisition loop.
pub trait Clock {
    /// Monotonic time since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    /// Block for `micros` microseconds. Non-positive values return at once.
    fn sleep_micros(&self, micros: i64);
}

/// [`Clock`] backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep_micros(&self, micros: i64) {
        if let Some(d) = sleep_duration(micros) {
            std::thread::sleep(d);
        }
    }
}
