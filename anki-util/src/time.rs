//! High resolution monotonic time.
//!
//! All time values are seconds expressed as `f64`, measured against a
//! process-local epoch captured on first use. [`std::time::Instant`] is the
//! backing counter on every supported platform; it is monotonic by contract,
//! so two consecutive reads on the same thread never go backwards.

use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Seconds elapsed since the process-local epoch. Monotonic, never decreasing.
pub fn now_seconds() -> f64 {
    epoch().elapsed().as_secs_f64()
}

/// Sleep for at least `seconds`.
///
/// The granularity is good enough for millisecond tick loops; non-positive
/// durations return immediately.
pub fn sleep(seconds: f64) {
    if seconds > 0.0 {
        thread::sleep(Duration::from_secs_f64(seconds));
    }
}

/// Start/stop timer for elapsed measurements.
///
/// ```
/// use anki_util::time::Timer;
///
/// let mut timer = Timer::start();
/// // ... do work ...
/// timer.stop();
/// let _secs = timer.elapsed_seconds();
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: f64,
    stop: Option<f64>,
}

impl Timer {
    /// Capture the starting timestamp.
    pub fn start() -> Timer {
        Timer {
            start: now_seconds(),
            stop: None,
        }
    }

    /// Capture the stopping timestamp.
    pub fn stop(&mut self) {
        self.stop = Some(now_seconds());
    }

    /// Seconds between start and stop, or between start and now while the
    /// timer is still running.
    pub fn elapsed_seconds(&self) -> f64 {
        self.stop.unwrap_or_else(now_seconds) - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic() {
        let mut prev = now_seconds();
        for _ in 0..1_000 {
            let now = now_seconds();
            assert!(now >= prev);
            prev = now;
        }
    }

    #[test]
    fn sleep_at_least() {
        let before = now_seconds();
        sleep(0.05);
        assert!(now_seconds() - before >= 0.05);
    }

    #[test]
    fn timer_elapsed() {
        let mut timer = Timer::start();
        sleep(0.02);
        timer.stop();
        let elapsed = timer.elapsed_seconds();
        assert!(elapsed >= 0.02);

        // A stopped timer does not keep counting.
        sleep(0.02);
        assert_eq!(timer.elapsed_seconds(), elapsed);
    }

    #[test]
    fn running_timer_counts() {
        let timer = Timer::start();
        sleep(0.01);
        assert!(timer.elapsed_seconds() >= 0.01);
    }
}
