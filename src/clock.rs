#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

/// Largest step handed to the animator, in seconds. Anything longer
/// (tab suspended, debugger break) is treated as one ~30 Hz frame.
pub const MAX_STEP: f32 = 0.033;

// Host timestamps arrive in milliseconds, like requestAnimationFrame.
const MS_PER_SECOND: f64 = 1000.0;

/// Time values handed to the animator for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    /// Clamped delta in seconds, always in `[0, max_step]`.
    pub dt: f32,
    /// Wall-clock seconds since the clock started. Never decreases.
    pub elapsed: f32,
}

/// Per-tick delta clock.
///
/// Fed with monotonic host timestamps in milliseconds. A timestamp older than the
/// stored one is treated as clock skew: the tick yields `dt = 0` and the stored
/// timestamp stays where it was.
#[derive(Debug, Clone)]
pub struct Clock {
    start_timestamp: f64,
    last_timestamp: f64,
    max_step: f32,
}

impl Clock {
    pub fn new(start_timestamp: f64) -> Self {
        Self::with_max_step(start_timestamp, MAX_STEP)
    }

    pub fn with_max_step(start_timestamp: f64, max_step: f32) -> Self {
        Self {
            start_timestamp,
            last_timestamp: start_timestamp,
            max_step: max_step.max(0.0),
        }
    }

    pub fn tick(&mut self, now: f64) -> FrameTime {
        let raw = ((now - self.last_timestamp) / MS_PER_SECOND) as f32;
        let dt = raw.clamp(0.0, self.max_step);

        self.last_timestamp = self.last_timestamp.max(now);

        FrameTime {
            dt,
            elapsed: self.elapsed(),
        }
    }

    pub fn elapsed(&self) -> f32 {
        ((self.last_timestamp - self.start_timestamp) / MS_PER_SECOND) as f32
    }

    pub fn last_timestamp(&self) -> f64 {
        self.last_timestamp
    }

    pub fn max_step(&self) -> f32 {
        self.max_step
    }
}

// Cross-platform source of host timestamps.
pub struct HostTimer {
    #[cfg(not(target_arch = "wasm32"))]
    start: Instant,
}

impl Default for HostTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl HostTimer {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            start: Instant::now(),
        }
    }

    /// Milliseconds on the host's monotonic clock.
    pub fn now_ms(&self) -> f64 {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.start.elapsed().as_secs_f64() * MS_PER_SECOND
        }

        #[cfg(target_arch = "wasm32")]
        {
            web_sys::window()
                .and_then(|w| w.performance())
                .map(|p| p.now())
                .unwrap_or_else(js_sys::Date::now)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_is_measured_from_start() {
        let mut clock = Clock::new(1000.0);
        let frame = clock.tick(1016.0);
        assert!((frame.dt - 0.016).abs() < 1e-6);
        assert!((frame.elapsed - 0.016).abs() < 1e-6);
        assert_eq!(clock.last_timestamp(), 1016.0);
    }

    #[test]
    fn test_long_gap_is_clamped() {
        let mut clock = Clock::new(0.0);
        let frame = clock.tick(5000.0);
        assert_eq!(frame.dt, MAX_STEP);
        // Elapsed time still follows the wall clock.
        assert!((frame.elapsed - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_clock_skew_yields_zero() {
        let mut clock = Clock::new(0.0);
        clock.tick(100.0);
        let frame = clock.tick(40.0);
        assert_eq!(frame.dt, 0.0);
        assert_eq!(clock.last_timestamp(), 100.0);

        // Recovers once the host catches up.
        let frame = clock.tick(116.0);
        assert!((frame.dt - 0.016).abs() < 1e-6);
    }

    #[test]
    fn test_dt_stays_in_bounds() {
        let mut clock = Clock::new(0.0);
        let stamps = [0.0, 3.0, 3.0, 50.0, 20.0, 400.0, 401.5, 10_000.0, 10_016.7];
        let mut last_elapsed = 0.0;
        for now in stamps {
            let frame = clock.tick(now);
            assert!(frame.dt >= 0.0 && frame.dt <= MAX_STEP, "dt {} out of range", frame.dt);
            assert!(frame.elapsed >= last_elapsed);
            last_elapsed = frame.elapsed;
        }
    }

    #[test]
    fn test_identical_timestamps() {
        let mut clock = Clock::new(10.0);
        assert_eq!(clock.tick(10.0).dt, 0.0);
        assert_eq!(clock.tick(10.0).dt, 0.0);
    }

    #[test]
    fn test_custom_max_step() {
        let mut clock = Clock::with_max_step(0.0, 0.1);
        assert!((clock.tick(80.0).dt - 0.08).abs() < 1e-6);
        assert_eq!(clock.tick(1000.0).dt, 0.1);
        assert_eq!(clock.max_step(), 0.1);
    }
}
