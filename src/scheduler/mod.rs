//! # Scheduler Module
//!
//! The cooperative scheduler deciding, every frame, which processors run.
//!
//! ## Key Components
//!
//! * `ProcessorManager` - Owns the per-condition-kind pending queues, the
//!   worker pool, and the trigger → dispatch → commit → re-arm cycle
//! * `condition` - Arming conditions and their pending-event bookkeeping
//! * `processor` - The schedulable unit, chains, and groups
//! * `worker_pool` - The fixed pool executing compute steps in parallel
//!
//! ## Cycle
//!
//! Event producers and the frame coordinator raise triggers. A trigger pass
//! moves eligible processors from the armed queues into the triggered batch.
//! The dispatch loop, on its own control thread, snapshots that batch, sends
//! every non-frame-affine processor's compute step (and its chain's) to the
//! worker pool, waits for the batch's computes to finish, hands the ordered
//! batch to the frame coordinator for the serialized commit phase, waits for
//! every commit to complete, and finally re-arms the batch.
//!
//! ## Thread Roles
//!
//! Producer threads only ever arm conditions or push pending events. Worker
//! threads only run compute steps. The frame coordinator thread is the only
//! thread that runs commit steps or draw passes. The shared state crossing
//! those roles lives behind the mutexes of [`SchedulerShared`]; the manager
//! instance is its single owner, no process-wide singletons are involved.

pub mod condition;
pub mod processor;
pub(crate) mod worker_pool;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{info, trace, warn};
use parking_lot::{Condvar, Mutex};
use web_time::Instant;

use condition::{ArmingCondition, ConditionKind, EventId, InputEvent, Trigger};
use processor::{for_each_in_chain, ProcessorGroup, ProcessorHandle};
use worker_pool::{ComputeJob, WorkerPool};

use crate::config::SchedulerConfig;

/// A timer queue entry: a processor and the absolute deadline computed when
/// its timer condition was armed.
struct TimerEntry {
    handle: Arc<ProcessorHandle>,
    deadline: Instant,
}

/// The per-condition-kind armed queues.
///
/// A processor armed through a collection appears in one queue per member
/// kind; triggering removes it from every queue at once, so between trigger
/// and commit it is in none of them.
#[derive(Default)]
struct ArmedQueues {
    new_frame: Vec<Arc<ProcessorHandle>>,
    timers: Vec<TimerEntry>,
    input: Vec<Arc<ProcessorHandle>>,
    posted: Vec<Arc<ProcessorHandle>>,
}

impl ArmedQueues {
    fn contains(&self, handle: &Arc<ProcessorHandle>) -> bool {
        let matches = |h: &Arc<ProcessorHandle>| Arc::ptr_eq(h, handle);
        self.new_frame.iter().any(matches)
            || self.input.iter().any(matches)
            || self.posted.iter().any(matches)
            || self.timers.iter().any(|entry| Arc::ptr_eq(&entry.handle, handle))
    }

    fn remove_everywhere(&mut self, handle: &Arc<ProcessorHandle>) {
        self.new_frame.retain(|h| !Arc::ptr_eq(h, handle));
        self.input.retain(|h| !Arc::ptr_eq(h, handle));
        self.posted.retain(|h| !Arc::ptr_eq(h, handle));
        self.timers.retain(|entry| !Arc::ptr_eq(&entry.handle, handle));
    }
}

/// State shared between producers, the dispatch loop, and the coordinator.
pub(crate) struct SchedulerShared {
    /// Armed queues, one per condition kind.
    armed: Mutex<ArmedQueues>,
    /// Processors that triggered since the last dispatch pass, in trigger
    /// order. Consumed by the dispatch loop.
    triggered: Mutex<Vec<Arc<ProcessorHandle>>>,
    /// Raised when the triggered batch becomes non-empty or on shutdown.
    triggered_signal: Condvar,
    /// Frame-affine processors handed to the coordinator for inline
    /// compute + commit.
    pub(crate) frame_affine: Mutex<Vec<Arc<ProcessorHandle>>>,
    /// Ordered batches whose computes finished, awaiting the commit phase.
    pub(crate) commit_ready: Mutex<VecDeque<Vec<Arc<ProcessorHandle>>>>,
    /// Guard for commit-completion waits; the predicate is the per-handle
    /// committed flag.
    commit_done: Mutex<()>,
    /// Raised after every individual commit completes and on shutdown.
    commit_done_signal: Condvar,
    /// The coordinator's frame counter, carried in new-frame triggers.
    frame_counter: AtomicU64,
    /// Set once; wakes every blocked party.
    shutdown: AtomicBool,
}

impl SchedulerShared {
    fn new() -> Self {
        Self {
            armed: Mutex::new(ArmedQueues::default()),
            triggered: Mutex::new(Vec::new()),
            triggered_signal: Condvar::new(),
            frame_affine: Mutex::new(Vec::new()),
            commit_ready: Mutex::new(VecDeque::new()),
            commit_done: Mutex::new(()),
            commit_done_signal: Condvar::new(),
            frame_counter: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Marks one processor's commit complete and wakes the dispatch loop.
    ///
    /// The empty critical section orders the flag store against a waiter's
    /// predicate check, so the wakeup cannot be lost.
    pub(crate) fn signal_commit_complete(&self, handle: &ProcessorHandle) {
        handle.set_committed(true);
        handle.clear_trigger();
        drop(self.commit_done.lock());
        self.commit_done_signal.notify_all();
    }

    /// Queues fired processors for dispatch, recording each one's concrete
    /// trigger.
    ///
    /// Callers must remove the handles from the armed queues under the same
    /// `armed` lock acquisition that selected them. Deciding eligibility and
    /// removal in one critical section is what keeps two concurrent trigger
    /// passes from dispatching the same processor twice (and from one pass
    /// overwriting the other's recorded trigger payload).
    fn fire(&self, fired: Vec<(Arc<ProcessorHandle>, Trigger)>) {
        if fired.is_empty() {
            return;
        }
        let mut triggered = self.triggered.lock();
        for (handle, trigger) in fired {
            trace!("Processor {} triggered by {trigger:?}", handle.id());
            handle.record_trigger(trigger);
            triggered.push(handle);
        }
        drop(triggered);
        self.triggered_signal.notify_all();
    }

    /// Runs the new-frame trigger pass and sweeps due timers.
    pub(crate) fn trigger_new_frame(&self) {
        let frame = self.frame_counter.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut fired = Vec::new();
        {
            let mut armed = self.armed.lock();

            // Due timers fire first so a timer armed many frames ago is not
            // starved behind this frame's tick subscribers. Disabled
            // processors are parked: skipped, left pending.
            let mut index = 0;
            while index < armed.timers.len() {
                let entry = &armed.timers[index];
                if entry.deadline <= now && entry.handle.is_enabled() {
                    let entry = armed.timers.swap_remove(index);
                    let interval = expire_timer(&entry.handle);
                    fired.push((entry.handle, Trigger::TimerElapsed { interval }));
                } else {
                    index += 1;
                }
            }

            // A collection of {timer, new-frame} whose timer just fired is
            // still in the new-frame queue at this point; one cycle per pass.
            for handle in &armed.new_frame {
                let already_fired = fired.iter().any(|(h, _)| Arc::ptr_eq(h, handle));
                if handle.is_enabled() && !already_fired {
                    fired.push((Arc::clone(handle), Trigger::NewFrame { frame }));
                }
            }

            for (handle, _) in &fired {
                armed.remove_everywhere(handle);
            }
        }
        self.fire(fired);
    }

    /// Fans an external-input event out to every armed listener and runs the
    /// input trigger pass.
    pub(crate) fn dispatch_external_event(&self, event: InputEvent) {
        let mut fired = Vec::new();
        {
            let mut armed = self.armed.lock();
            for handle in &armed.input {
                let condition = handle.condition();
                let Some(listener) = condition.as_ref().and_then(|c| {
                    match c.find(ConditionKind::InputEvent) {
                        Some(ArmingCondition::InputEvent(listener)) => Some(listener.clone()),
                        _ => None,
                    }
                }) else {
                    continue;
                };
                drop(condition);

                // Every armed listener receives the event; parked (disabled)
                // processors keep it queued until they are re-enabled.
                listener.push(Arc::clone(&event));
                if handle.is_enabled() {
                    fired.push((Arc::clone(handle), Trigger::InputEvents(listener.drain())));
                }
            }
            for (handle, _) in &fired {
                armed.remove_everywhere(handle);
            }
        }
        self.fire(fired);
    }

    /// Fans a posted event out to every armed matching condition and runs
    /// the posted-event trigger pass.
    pub(crate) fn post_event(&self, id: EventId) {
        let mut fired = Vec::new();
        {
            let mut armed = self.armed.lock();
            for handle in &armed.posted {
                let condition = handle.condition();
                let Some(ArmingCondition::PostedEvent(posted)) = condition
                    .as_ref()
                    .and_then(|c| c.find(ConditionKind::PostedEvent))
                else {
                    continue;
                };
                if !posted.matches(id) {
                    continue;
                }
                posted.post(id);
                if handle.is_enabled() {
                    let snapshot = posted.freeze();
                    drop(condition);
                    fired.push((Arc::clone(handle), Trigger::PostedEvents(snapshot)));
                }
            }
            for (handle, _) in &fired {
                armed.remove_everywhere(handle);
            }
        }
        self.fire(fired);
    }

    /// Arms a processor according to its installed condition.
    ///
    /// A leaf that already has events pending raises its trigger
    /// immediately, so a late subscriber is not starved until the next
    /// unrelated event.
    fn arm(&self, handle: &Arc<ProcessorHandle>) {
        let mut immediate: Option<Trigger> = None;
        {
            // Lock order is armed queues before the handle's condition,
            // matching the trigger passes.
            let mut armed = self.armed.lock();
            let condition = handle.condition();
            let Some(condition) = condition.as_ref() else {
                return;
            };
            let now = Instant::now();
            let already = |queue: &[Arc<ProcessorHandle>]| {
                queue.iter().any(|h| Arc::ptr_eq(h, handle))
            };
            condition.for_each_leaf(&mut |leaf| match leaf {
                ArmingCondition::NewFrame => {
                    if !already(&armed.new_frame) {
                        armed.new_frame.push(Arc::clone(handle));
                    }
                }
                ArmingCondition::TimerElapsed(timer) => {
                    if !armed.timers.iter().any(|e| Arc::ptr_eq(&e.handle, handle)) {
                        armed.timers.push(TimerEntry {
                            handle: Arc::clone(handle),
                            deadline: timer.arm_deadline(now),
                        });
                    }
                }
                ArmingCondition::InputEvent(listener) => {
                    if !already(&armed.input) {
                        armed.input.push(Arc::clone(handle));
                    }
                    if immediate.is_none() && listener.has_pending() {
                        immediate = Some(Trigger::InputEvents(listener.drain()));
                    }
                }
                ArmingCondition::PostedEvent(posted) => {
                    if !already(&armed.posted) {
                        armed.posted.push(Arc::clone(handle));
                    }
                    if immediate.is_none() && posted.has_pending() {
                        immediate = Some(Trigger::PostedEvents(posted.freeze()));
                    }
                }
                ArmingCondition::Collection(_) => unreachable!("for_each_leaf yields leaves"),
            });
            if immediate.is_some() {
                armed.remove_everywhere(handle);
            }
        }
        if let Some(trigger) = immediate {
            self.fire(vec![(Arc::clone(handle), trigger)]);
        }
    }
}

/// Marks a handle's timer fired: clears its stored deadline so the next
/// re-arm restarts the interval, and returns the interval for the trigger
/// payload.
fn expire_timer(handle: &Arc<ProcessorHandle>) -> web_time::Duration {
    let condition = handle.condition();
    match condition.as_ref().and_then(|c| c.find(ConditionKind::TimerElapsed)) {
        Some(ArmingCondition::TimerElapsed(timer)) => {
            timer.clear_deadline();
            timer.interval()
        }
        _ => web_time::Duration::ZERO,
    }
}

/// The scheduler: owns the armed queues, the worker pool, and the dispatch
/// loop's control thread.
///
/// # Examples
///
/// ```no_run
/// use frame_scheduler::config::SchedulerConfig;
/// use frame_scheduler::frame::FrameCoordinator;
/// use frame_scheduler::scheduler::ProcessorManager;
///
/// let manager = ProcessorManager::new(SchedulerConfig::default());
/// let coordinator = FrameCoordinator::new(&manager);
///
/// // The frame coordinator owns the render thread.
/// std::thread::spawn(move || coordinator.run());
/// ```
pub struct ProcessorManager {
    shared: Arc<SchedulerShared>,
    config: SchedulerConfig,
    control: Option<JoinHandle<()>>,
}

impl ProcessorManager {
    /// Creates a manager, spawning the worker pool and the control thread.
    pub fn new(config: SchedulerConfig) -> Self {
        let shared = Arc::new(SchedulerShared::new());
        let pool = WorkerPool::new(config.effective_worker_count());

        let loop_shared = Arc::clone(&shared);
        let control = std::thread::Builder::new()
            .name("scheduler-dispatch".to_owned())
            .spawn(move || dispatch_loop(loop_shared, pool))
            .expect("failed to spawn dispatch thread");

        Self {
            shared,
            config,
            control: Some(control),
        }
    }

    /// Returns the configuration this manager was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub(crate) fn shared(&self) -> Arc<SchedulerShared> {
        Arc::clone(&self.shared)
    }

    /// Registers a processor and arms it.
    ///
    /// Calls the processor's `initialize` hook exactly once to install its
    /// arming condition. A processor that returns no condition is treated
    /// as a configuration error: it stays registered but is never
    /// triggered. Safe to call concurrently with the dispatch loop.
    pub fn add_processor(&self, handle: &Arc<ProcessorHandle>) {
        {
            let mut condition = handle.condition();
            if condition.is_some() {
                warn!(
                    "Processor {} is already registered; ignoring double registration",
                    handle.id()
                );
                return;
            }
            let installed = handle.processor().initialize();
            match installed {
                Some(installed) => *condition = Some(installed),
                None => {
                    warn!(
                        "Processor {} ({}) installed no arming condition; it will never trigger",
                        handle.id(),
                        handle.name()
                    );
                    return;
                }
            }
        }
        trace!("Processor {} registered", handle.id());
        self.shared.arm(handle);
    }

    /// Deregisters a processor.
    ///
    /// The processor is removed from every pending queue, its unfinished
    /// trigger state is discarded, and its condition's pending events are
    /// drained so a later re-registration starts clean.
    pub fn remove_processor(&self, handle: &Arc<ProcessorHandle>) {
        {
            let mut armed = self.shared.armed.lock();
            armed.remove_everywhere(handle);
        }
        self.shared
            .triggered
            .lock()
            .retain(|h| !Arc::ptr_eq(h, handle));

        // A handle already handed to the coordinator belongs to a batch the
        // dispatch loop is waiting on; complete its commit here so removal
        // cannot stall the batch.
        let in_handoff = {
            let mut frame_affine = self.shared.frame_affine.lock();
            let before = frame_affine.len();
            frame_affine.retain(|h| !Arc::ptr_eq(h, handle));
            frame_affine.len() != before
        };
        if in_handoff {
            self.shared.signal_commit_complete(handle);
        }

        if let Some(condition) = handle.condition().take() {
            condition.reset_pending();
        }
        handle.clear_trigger();
        trace!("Processor {} deregistered", handle.id());
    }

    /// Registers every member of a group, in insertion order.
    pub fn add_group(&self, group: &ProcessorGroup) {
        for handle in group.members() {
            self.add_processor(handle);
        }
    }

    /// Deregisters every member of a group.
    pub fn remove_group(&self, group: &ProcessorGroup) {
        for handle in group.members() {
            self.remove_processor(handle);
        }
    }

    /// Raises the new-frame trigger.
    ///
    /// Called once per frame coordinator iteration; also sweeps due timers.
    pub fn trigger_new_frame(&self) {
        self.shared.trigger_new_frame();
    }

    /// Fans an external-input event out to every armed input listener.
    ///
    /// Called by the host input system on its own thread.
    pub fn dispatch_external_event(&self, event: InputEvent) {
        self.shared.dispatch_external_event(event);
    }

    /// Posts a user event to every armed matching posted-event condition.
    ///
    /// Safe to call from arbitrary producer code.
    pub fn post_event(&self, id: EventId) {
        self.shared.post_event(id);
    }

    /// Returns whether the processor currently sits in any armed queue.
    ///
    /// Between the moment a processor triggers and the moment its commit
    /// completes this is `false` by invariant.
    pub fn is_armed(&self, handle: &Arc<ProcessorHandle>) -> bool {
        self.shared.armed.lock().contains(handle)
    }

    /// Stops the dispatch loop and wakes every blocked party.
    ///
    /// The frame coordinator observes the same flag and exits its loop on
    /// the next iteration.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.triggered_signal.notify_all();
        self.shared.commit_done_signal.notify_all();
    }
}

impl Drop for ProcessorManager {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(control) = self.control.take() {
            let _ = control.join();
        }
        info!("Scheduler shut down");
    }
}

/// The dispatch loop body, run on the control thread.
///
/// One pass handles one frame's batch: snapshot the triggered processors,
/// route frame-affine ones to the coordinator, submit the rest (chains
/// included) to the worker pool, wait for the computes, hand the ordered
/// batch over for the commit phase, wait for every commit, re-arm.
fn dispatch_loop(shared: Arc<SchedulerShared>, mut pool: WorkerPool) {
    trace!("Dispatch loop started");
    loop {
        // 1. Block until the triggered batch is non-empty.
        let run_list: Vec<Arc<ProcessorHandle>> = {
            let mut triggered = shared.triggered.lock();
            while triggered.is_empty() && !shared.is_shutdown() {
                shared.triggered_signal.wait(&mut triggered);
            }
            if shared.is_shutdown() {
                break;
            }
            std::mem::take(&mut *triggered)
        };

        // 2. Route and submit. Frame-affine processors bypass the pool and
        //    run inline on the coordinator thread.
        let mut pool_units = Vec::with_capacity(run_list.len());
        for unit in &run_list {
            let Some(trigger) = unit.fired_trigger() else {
                warn!("Processor {} triggered without a recorded trigger", unit.id());
                unit.set_committed(true);
                continue;
            };
            if unit.is_frame_affine() {
                shared.frame_affine.lock().push(Arc::clone(unit));
            } else {
                for_each_in_chain(unit, |member| {
                    pool.submit(ComputeJob {
                        unit: Arc::clone(member),
                        trigger: trigger.clone(),
                    });
                });
                pool_units.push(Arc::clone(unit));
            }
        }

        // 3. The batch is handed over only once all its computes finished.
        pool.wait_idle();
        if !pool_units.is_empty() {
            shared.commit_ready.lock().push_back(pool_units);
        }

        // 4. Block until the coordinator confirms the commit phase for the
        //    whole batch (frame-affine processors included).
        {
            let mut guard = shared.commit_done.lock();
            while !run_list.iter().all(|unit| unit.is_committed()) && !shared.is_shutdown() {
                shared.commit_done_signal.wait(&mut guard);
            }
        }
        if shared.is_shutdown() {
            break;
        }

        // 5. Re-arm. A deregistered processor has no condition left and
        //    stays detached.
        for unit in &run_list {
            unit.set_committed(false);
            shared.arm(unit);
        }
    }
    trace!("Dispatch loop stopped");
}
