//! # Scheduler Configuration
//!
//! Runtime configuration for the scheduler and the frame coordinator.
//!
//! Configuration can be constructed in code via [`SchedulerConfig::default`]
//! or loaded from a JSON file with [`SchedulerConfig::load`]. Every field has
//! a serde default, so a partial configuration file only needs to name the
//! fields it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::error::ConfigError;

/// Default target frame rate in frames per second.
const DEFAULT_TARGET_FPS: u32 = 60;

/// Default number of frames between FPS reports to the observer.
const DEFAULT_FPS_REPORT_INTERVAL: u64 = 120;

/// Configuration for the scheduler and frame coordinator.
///
/// # Examples
///
/// ```
/// use frame_scheduler::config::SchedulerConfig;
///
/// let config = SchedulerConfig::default();
/// assert_eq!(config.target_fps, 60);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Desired frame rate in frames per second.
    pub target_fps: u32,

    /// Number of worker threads in the compute pool.
    ///
    /// When `None`, the pool defaults to twice the host's available hardware
    /// concurrency.
    pub worker_count: Option<usize>,

    /// How often, in frames, the measured FPS is reported to the observer.
    pub fps_report_interval: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            worker_count: None,
            fps_report_interval: DEFAULT_FPS_REPORT_INTERVAL,
        }
    }
}

impl SchedulerConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the JSON configuration file
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Returns the desired duration of one frame.
    ///
    /// A `target_fps` of zero is clamped to one to keep the interval finite.
    pub fn frame_interval(&self) -> Duration {
        let fps = self.target_fps.max(1);
        Duration::from_secs_f64(1.0 / f64::from(fps))
    }

    /// Returns the worker pool size to use.
    ///
    /// Either the configured `worker_count`, or twice the host's available
    /// hardware concurrency when unset.
    pub fn effective_worker_count(&self) -> usize {
        match self.worker_count {
            Some(count) => count.max(1),
            None => {
                let parallelism = std::thread::available_parallelism()
                    .map(std::num::NonZeroUsize::get)
                    .unwrap_or(2);
                parallelism * 2
            }
        }
    }
}
