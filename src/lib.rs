#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Frame Scheduler
//!
//! A real-time frame scheduler for a retained-mode scene graph. Every frame
//! it decides which units of application logic run, executes their
//! non-mutating compute steps in parallel across a worker pool, then
//! serializes their scene-mutating commit steps on a single frame-owning
//! thread, which draws and paces itself to a target frame rate.
//!
//! ## Key Modules
//!
//! * `scheduler` - Processors, arming conditions, the worker pool, and the
//!   dispatch cycle
//! * `frame` - The frame coordinator loop, render-target seam, and pacing
//! * `config` - Runtime configuration (target FPS, pool size, reporting)
//! * `error` - The error taxonomy
//!
//! ## Architecture
//!
//! A [`Processor`] owns one [`ArmingCondition`] describing when it becomes
//! eligible to run: a frame tick, an elapsed timer, queued external input,
//! a posted user event, or a collection of those. Trigger sources move
//! eligible processors into a batch; the [`ProcessorManager`]'s dispatch
//! loop sends each batch's compute steps to the worker pool, then hands the
//! ordered batch to the [`FrameCoordinator`], which runs every commit step
//! serially before drawing and pacing. Processors are re-armed only after
//! their own commit completes, so a processor is never dispatched twice for
//! the same cycle.
//!
//! The two-phase contract is the point of the design: compute steps never
//! mutate shared scene state, so they run concurrently without locking the
//! scene, and commit steps have the scene to themselves on the frame
//! thread.
//!
//! ## Usage
//!
//! ```no_run
//! use frame_scheduler::{
//!     ArmingCondition, FrameCoordinator, Processor, ProcessorHandle,
//!     ProcessorManager, SchedulerConfig, StepError, Trigger,
//! };
//!
//! struct Spinner {
//!     angle: f32,
//!     next_angle: f32,
//! }
//!
//! impl Processor for Spinner {
//!     fn initialize(&mut self) -> Option<ArmingCondition> {
//!         Some(ArmingCondition::NewFrame)
//!     }
//!
//!     fn compute(&mut self, _trigger: &Trigger) -> Result<(), StepError> {
//!         self.next_angle = self.angle + 0.01; // read-only w.r.t. the scene
//!         Ok(())
//!     }
//!
//!     fn commit(&mut self, _trigger: &Trigger) -> Result<(), StepError> {
//!         self.angle = self.next_angle; // scene mutation, frame thread only
//!         Ok(())
//!     }
//! }
//!
//! let manager = ProcessorManager::new(SchedulerConfig::default());
//! let spinner = ProcessorHandle::new(Box::new(Spinner { angle: 0.0, next_angle: 0.0 }));
//! manager.add_processor(&spinner);
//!
//! let coordinator = FrameCoordinator::new(&manager);
//! std::thread::spawn(move || coordinator.run());
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use error::{ConfigError, StepError};
pub use frame::{FrameCoordinator, HostLockHooks, RenderTarget, StructuralUpdateSender};
pub use scheduler::condition::{
    ArmingCondition, ConditionKind, EventId, InputEvent, InputListener, PostedEventCondition,
    TimerCondition, Trigger,
};
pub use scheduler::processor::{for_each_in_chain, Processor, ProcessorGroup, ProcessorHandle};
pub use scheduler::ProcessorManager;
