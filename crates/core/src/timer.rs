//! Frame timing helpers.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring elapsed time.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Get the total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the elapsed time in seconds since the timer was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Get the time elapsed since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Get the delta time in seconds since the last tick.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts frames and reports an average rate once per sampling window.
#[derive(Debug)]
pub struct FpsCounter {
    window: Duration,
    accumulated: Duration,
    frames: u32,
}

impl FpsCounter {
    /// Creates a counter that reports once per `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            accumulated: Duration::ZERO,
            frames: 0,
        }
    }

    /// Records one frame that took `delta`.
    ///
    /// Returns the frames-per-second average once the sampling window has
    /// elapsed, then starts a new window.
    pub fn record(&mut self, delta: Duration) -> Option<f64> {
        self.accumulated += delta;
        self.frames += 1;

        if self.accumulated < self.window {
            return None;
        }

        let fps = f64::from(self.frames) / self.accumulated.as_secs_f64();
        self.accumulated = Duration::ZERO;
        self.frames = 0;
        Some(fps)
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_tick_is_monotonic() {
        let mut timer = Timer::new();
        let first = timer.tick();
        let second = timer.tick();
        assert!(first >= Duration::ZERO);
        assert!(second >= Duration::ZERO);
        assert!(timer.elapsed() >= first + second);
    }

    #[test]
    fn test_fps_counter_reports_after_window() {
        let mut counter = FpsCounter::new(Duration::from_secs(1));
        let frame = Duration::from_millis(250);

        assert_eq!(counter.record(frame), None);
        assert_eq!(counter.record(frame), None);
        assert_eq!(counter.record(frame), None);

        let fps = counter.record(frame).unwrap();
        assert!((fps - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_fps_counter_starts_new_window() {
        let mut counter = FpsCounter::new(Duration::from_millis(100));
        assert!(counter.record(Duration::from_millis(100)).is_some());
        assert_eq!(counter.record(Duration::from_millis(10)), None);
    }
}
