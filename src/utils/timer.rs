//! Timer utilities
//!
//! Provides timing and measurement helpers.

use std::time::{Duration, Instant};

/// Labelled timer for host-level measurements
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    /// Create and start a new timer
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Stop timer and return elapsed time
    pub fn stop(self) -> Duration {
        let elapsed = self.elapsed();
        tracing::debug!("{}: {}ms", self.label, elapsed.as_millis());
        elapsed
    }
}

/// Stopwatch measuring a test from admission to its terminal transition.
///
/// Stopping freezes the reading; later stops return the same value.
#[derive(Clone, Copy, Debug)]
pub struct Stopwatch {
    start: Instant,
    stopped: Option<Duration>,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            stopped: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.stopped.unwrap_or_else(|| self.start.elapsed())
    }

    pub fn stop(&mut self) -> Duration {
        *self.stopped.get_or_insert_with(|| self.start.elapsed())
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }
}

/// Compact human-readable duration: `42ms`, `1.5s`, ` 12s`, `3m`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_secs_f64() * 1000.0;
    let secs = elapsed.as_secs_f64();
    if millis < 100.0 {
        format!("{:>2.0}ms", millis)
    } else if secs < 10.0 {
        format!("{:.1}s", secs)
    } else if secs < 100.0 {
        format!("{:>3.0}s", secs)
    } else {
        format!("{:.0}m", secs / 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_timer() {
        let timer = Timer::start("test");
        sleep(Duration::from_millis(10));
        let elapsed = timer.elapsed_ms();
        assert!(elapsed >= 10);
    }

    #[test]
    fn test_stopwatch_freezes_on_stop() {
        let mut sw = Stopwatch::start();
        sleep(Duration::from_millis(10));
        let first = sw.stop();
        sleep(Duration::from_millis(10));
        assert_eq!(sw.stop(), first);
        assert_eq!(sw.elapsed(), first);
        assert!(sw.is_stopped());
        assert!(first >= Duration::from_millis(10));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(7)), " 7ms");
        assert_eq!(format_elapsed(Duration::from_millis(42)), "42ms");
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_elapsed(Duration::from_secs(42)), " 42s");
        assert_eq!(format_elapsed(Duration::from_secs(600)), "10m");
    }
}
