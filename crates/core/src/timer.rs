//! Frame timing.

use std::time::{Duration, Instant};

/// Tracks time since startup and the delta between marked frames.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    frame_mark: Instant,
    delta: Duration,
}

impl FrameTimer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            frame_mark: now,
            delta: Duration::ZERO,
        }
    }

    /// Seconds since the timer was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Mark the start of a new frame and return the time since the previous mark.
    pub fn mark_frame(&mut self) -> Duration {
        let now = Instant::now();
        self.delta = now - self.frame_mark;
        self.frame_mark = now;
        self.delta
    }

    /// Delta between the last two marks.
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Frames per second derived from the last delta, or 0 before the second mark.
    pub fn frame_rate(&self) -> f32 {
        let secs = self.delta.as_secs_f32();
        if secs > 0.0 { 1.0 / secs } else { 0.0 }
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rate_before_first_mark() {
        let timer = FrameTimer::new();
        assert_eq!(timer.delta(), Duration::ZERO);
        assert_eq!(timer.frame_rate(), 0.0);
    }

    #[test]
    fn test_mark_frame_updates_delta() {
        let mut timer = FrameTimer::new();
        std::thread::sleep(Duration::from_millis(2));
        let delta = timer.mark_frame();
        assert!(delta >= Duration::from_millis(2));
        assert_eq!(timer.delta(), delta);
        assert!(timer.frame_rate() > 0.0);
        assert!(timer.elapsed_secs() >= delta.as_secs_f32());
    }
}
