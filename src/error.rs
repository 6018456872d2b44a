//! # Error Types
//!
//! This module defines the error taxonomy for the scheduler:
//! - `StepError` - The boxed error type returned by a processor's compute or
//!   commit step. Step failures are caught at the call site, logged with the
//!   originating processor identified, and never abort the batch.
//! - `ConfigError` - Failures while loading a scheduler configuration file.
//!
//! Nothing in this crate is expected to be fatal to the process; isolating a
//! failure to a single processor's cycle is the governing principle.

use thiserror::Error;

/// The error type a processor's compute or commit step may return.
///
/// Steps report failure by returning any boxed error. The worker pool and the
/// frame coordinator log the error together with the processor id and treat
/// the step as complete, so a single faulty processor never stalls the frame
/// loop or its sibling processors.
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while loading a [`SchedulerConfig`](crate::config::SchedulerConfig)
/// from disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read scheduler config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file was not valid JSON.
    #[error("failed to parse scheduler config: {0}")]
    Parse(#[from] serde_json::Error),
}
