//! # Processor Units
//!
//! This module defines the schedulable unit of the system:
//! - `Processor` - The trait application logic implements
//! - `ProcessorHandle` - The scheduler-facing record wrapping a processor
//! - `ProcessorGroup` - An ordered bundle registered/deregistered together
//! - `for_each_in_chain` - The single shared chain-walk routine
//!
//! ## Two-Phase Contract
//!
//! A processor's work is split into a compute step and a commit step. Compute
//! runs on a worker thread (or inline on the frame thread for frame-affine
//! processors) and must not mutate shared scene state; it reads inputs and
//! stores results on the processor itself. Commit runs only on the frame
//! coordinator thread, strictly serialized against every other commit, and
//! applies those results to the scene. This contract is what lets many
//! processors touch a shared mutable scene without locking it during
//! rendering.
//!
//! ## Lifecycle
//!
//! A handle is created detached and becomes schedulable when registered with
//! the [`ProcessorManager`](crate::scheduler::ProcessorManager). Registration
//! calls [`Processor::initialize`] exactly once to install the arming
//! condition. Deregistration detaches the handle: its condition is removed
//! from every pending queue and any unfinished trigger state is discarded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::condition::{ArmingCondition, Trigger};
use crate::error::StepError;

/// Source of unique processor ids, stable for a handle's lifetime.
static NEXT_PROCESSOR_ID: AtomicU64 = AtomicU64::new(1);

/// A schedulable unit of application logic.
///
/// Implementors hold whatever state their behavior needs; the scheduler only
/// ever calls the three methods below.
pub trait Processor: Send {
    /// A short name used in log messages.
    fn name(&self) -> &str {
        "processor"
    }

    /// Called exactly once when the processor is registered.
    ///
    /// Returns the arming condition describing when this processor becomes
    /// eligible to run. Returning `None` is treated as a configuration
    /// error: the processor stays registered but is never triggered, and a
    /// warning is logged.
    fn initialize(&mut self) -> Option<ArmingCondition>;

    /// The parallel, non-mutating step of a triggered cycle.
    ///
    /// Runs on a worker thread with no ordering guarantee relative to other
    /// processors' compute steps. Must not mutate shared scene state; store
    /// results on `self` for the commit step to apply.
    ///
    /// # Arguments
    ///
    /// * `trigger` - The concrete condition that fired this cycle
    ///
    /// # Errors
    ///
    /// A returned error is logged and the step is treated as complete.
    fn compute(&mut self, trigger: &Trigger) -> Result<(), StepError>;

    /// The serialized, scene-mutating step of a triggered cycle.
    ///
    /// Runs only on the frame coordinator thread, after every compute step
    /// of the batch has finished, in trigger order.
    ///
    /// # Arguments
    ///
    /// * `trigger` - The same trigger the compute step observed
    ///
    /// # Errors
    ///
    /// A returned error is logged and the batch continues.
    fn commit(&mut self, trigger: &Trigger) -> Result<(), StepError>;
}

/// The scheduler-facing record for one processor.
///
/// Handles are shared via `Arc` between the scheduler's queues, the worker
/// pool, and the frame coordinator. The no-double-dispatch invariant keeps
/// the inner processor mutex uncontended: between trigger and commit the
/// handle is owned by exactly one stage of the cycle at a time.
pub struct ProcessorHandle {
    id: u64,
    enabled: AtomicBool,
    frame_affine: AtomicBool,
    externally_lockable: AtomicBool,
    committed: AtomicBool,
    next: Mutex<Option<Arc<ProcessorHandle>>>,
    condition: Mutex<Option<ArmingCondition>>,
    fired: Mutex<Option<Trigger>>,
    inner: Mutex<Box<dyn Processor>>,
}

impl ProcessorHandle {
    /// Wraps a processor in a new, detached handle.
    ///
    /// The handle is enabled, not frame affine, and has no chain successor.
    pub fn new(processor: Box<dyn Processor>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_PROCESSOR_ID.fetch_add(1, Ordering::Relaxed),
            enabled: AtomicBool::new(true),
            frame_affine: AtomicBool::new(false),
            externally_lockable: AtomicBool::new(false),
            committed: AtomicBool::new(false),
            next: Mutex::new(None),
            condition: Mutex::new(None),
            fired: Mutex::new(None),
            inner: Mutex::new(processor),
        })
    }

    /// Returns this handle's stable identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the processor's log name.
    pub fn name(&self) -> String {
        self.inner.lock().name().to_owned()
    }

    /// Returns whether the processor is currently enabled.
    ///
    /// A disabled processor is parked, not disarmed: it is skipped by
    /// trigger passes but stays in its pending queues.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enables or disables the processor.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Returns whether the processor must run on the frame thread.
    pub fn is_frame_affine(&self) -> bool {
        self.frame_affine.load(Ordering::Acquire)
    }

    /// Opts the processor into synchronous execution on the frame thread.
    ///
    /// A frame-affine processor's compute step runs inline during the frame
    /// loop, immediately followed by its commit step, with no worker pool
    /// involvement. Intended for logic touching resources only valid on
    /// that thread.
    pub fn set_frame_affine(&self, frame_affine: bool) {
        self.frame_affine.store(frame_affine, Ordering::Release);
    }

    /// Returns whether the host-toolkit lock is released around commits.
    pub fn is_externally_lockable(&self) -> bool {
        self.externally_lockable.load(Ordering::Acquire)
    }

    /// Declares that this processor's commit interacts with host UI code.
    ///
    /// The frame coordinator releases its cooperative host-toolkit lock
    /// before running such a commit and reacquires it immediately after, so
    /// the commit cannot deadlock against that lock.
    pub fn set_externally_lockable(&self, lockable: bool) {
        self.externally_lockable.store(lockable, Ordering::Release);
    }

    /// Returns the next processor in this handle's chain, if any.
    pub fn next(&self) -> Option<Arc<ProcessorHandle>> {
        self.next.lock().clone()
    }

    /// Links `next` as this handle's chain successor.
    ///
    /// Chained processors' compute steps are dispatched with the head's and
    /// their commit steps run back to back after the head's, with no other
    /// processor's commit interleaved.
    pub fn set_next(&self, next: Option<Arc<ProcessorHandle>>) {
        *self.next.lock() = next;
    }

    /// Locks and returns the inner processor.
    pub(crate) fn processor(&self) -> MutexGuard<'_, Box<dyn Processor>> {
        self.inner.lock()
    }

    /// Locks and returns the installed arming condition slot.
    pub(crate) fn condition(&self) -> MutexGuard<'_, Option<ArmingCondition>> {
        self.condition.lock()
    }

    /// Records the concrete condition that fired for this cycle.
    pub(crate) fn record_trigger(&self, trigger: Trigger) {
        *self.fired.lock() = Some(trigger);
    }

    /// Returns a copy of the trigger recorded for this cycle.
    pub(crate) fn fired_trigger(&self) -> Option<Trigger> {
        self.fired.lock().clone()
    }

    /// Clears the recorded trigger after the commit step completes.
    pub(crate) fn clear_trigger(&self) {
        *self.fired.lock() = None;
    }

    /// Returns whether this cycle's commit step has completed.
    pub(crate) fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    /// Marks this cycle's commit step complete (or resets the mark).
    pub(crate) fn set_committed(&self, committed: bool) {
        self.committed.store(committed, Ordering::Release);
    }
}

impl std::fmt::Debug for ProcessorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorHandle")
            .field("id", &self.id)
            .field("enabled", &self.is_enabled())
            .field("frame_affine", &self.is_frame_affine())
            .finish()
    }
}

/// Walks a processor chain from `head`, calling `f` on every member in order.
///
/// This is the single shared traversal used by both compute submission and
/// commit execution; chain semantics live here and nowhere else.
pub fn for_each_in_chain(head: &Arc<ProcessorHandle>, mut f: impl FnMut(&Arc<ProcessorHandle>)) {
    let mut current = Some(Arc::clone(head));
    while let Some(handle) = current {
        f(&handle);
        current = handle.next();
    }
}

/// An ordered bundle of processors registered and deregistered together.
///
/// Used when one logical feature owns several independently-armed behaviors.
/// Iteration order is insertion order.
#[derive(Default)]
pub struct ProcessorGroup {
    members: Vec<Arc<ProcessorHandle>>,
}

impl ProcessorGroup {
    /// Creates an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a processor to the group.
    pub fn add(&mut self, handle: Arc<ProcessorHandle>) {
        self.members.push(handle);
    }

    /// Returns the group's members in insertion order.
    pub fn members(&self) -> &[Arc<ProcessorHandle>] {
        &self.members
    }

    /// Returns the number of processors in the group.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
