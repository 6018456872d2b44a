//! # Frame Pacing
//!
//! Budget arithmetic for the frame loop and the FPS reporting counter. The
//! arithmetic lives in free functions so pacing behavior can be tested
//! without a clock or a running coordinator.

use web_time::{Duration, Instant};

/// Returns how long the frame loop should sleep to hold its target rate.
///
/// # Arguments
///
/// * `frame_interval` - The desired duration of one frame
/// * `elapsed` - How long the frame's work actually took
///
/// # Returns
///
/// `Some(remaining)` when the frame finished under budget, `None` when it
/// overran and the loop should proceed immediately (a dropped frame, not an
/// error).
pub fn sleep_budget(frame_interval: Duration, elapsed: Duration) -> Option<Duration> {
    if elapsed >= frame_interval {
        None
    } else {
        Some(frame_interval - elapsed)
    }
}

/// Returns the budget left for the commit phase after the draw pass.
///
/// Saturates at zero; the commit phase is allowed to overrun, which shows up
/// as a shorter (or skipped) pacing sleep.
pub fn remaining_budget(frame_interval: Duration, spent: Duration) -> Duration {
    frame_interval.saturating_sub(spent)
}

/// Counts frames and periodically measures frames per second.
///
/// The coordinator calls [`FpsCounter::frame_completed`] once per frame and
/// forwards any returned measurement to the observer callback.
pub struct FpsCounter {
    report_interval: u64,
    frames_since_report: u64,
    window_start: Instant,
}

impl FpsCounter {
    /// Creates a counter that reports every `report_interval` frames.
    ///
    /// An interval of zero disables reporting.
    pub fn new(report_interval: u64) -> Self {
        Self {
            report_interval,
            frames_since_report: 0,
            window_start: Instant::now(),
        }
    }

    /// Records a completed frame.
    ///
    /// # Returns
    ///
    /// The measured FPS over the window just closed, every
    /// `report_interval` frames; `None` otherwise.
    pub fn frame_completed(&mut self) -> Option<f64> {
        if self.report_interval == 0 {
            return None;
        }
        self.frames_since_report += 1;
        if self.frames_since_report < self.report_interval {
            return None;
        }

        let window = self.window_start.elapsed();
        let fps = if window.as_secs_f64() > 0.0 {
            self.frames_since_report as f64 / window.as_secs_f64()
        } else {
            0.0
        };
        self.frames_since_report = 0;
        self.window_start = Instant::now();
        Some(fps)
    }
}
