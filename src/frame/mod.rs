//! # Frame Coordination
//!
//! The frame coordinator is the single frame-owning thread of the system: it
//! is the only thread that ever executes a commit step or issues a draw
//! call. One iteration of its loop applies queued structural updates, runs
//! frame-affine processors inline, draws every render target in priority
//! order, drains the serialized commit phase for the batches the scheduler
//! dispatched, emits the next frame tick, and paces itself to the target
//! frame rate.
//!
//! ## Key Components
//!
//! * `FrameCoordinator` - The loop itself
//! * `RenderTarget` - The narrow interface to the out-of-scope graphics
//!   engine (apply updates, draw, post-draw hook)
//! * `HostLockHooks` - Cooperative release/reacquire of a host-toolkit lock
//!   around externally-lockable commits
//! * `pacing` - Budget arithmetic and FPS measurement

pub mod pacing;

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use log::{error, info, trace};
use web_time::{Duration, Instant};

use crate::scheduler::condition::Trigger;
use crate::scheduler::processor::{for_each_in_chain, ProcessorHandle};
use crate::scheduler::{ProcessorManager, SchedulerShared};

use pacing::FpsCounter;

/// A deferred structural change applied on the frame thread.
///
/// Producers queue buffer and entity-registration changes from any thread;
/// the coordinator applies them at the top of the next frame, before
/// anything reads the scene.
pub type StructuralUpdate = Box<dyn FnOnce() + Send>;

/// A cloneable handle for queueing structural updates from other threads.
#[derive(Clone)]
pub struct StructuralUpdateSender {
    sender: Sender<StructuralUpdate>,
}

impl StructuralUpdateSender {
    /// Queues an update for the next frame.
    ///
    /// Updates queued after the coordinator has shut down are silently
    /// dropped.
    pub fn send(&self, update: StructuralUpdate) {
        let _ = self.sender.send(update);
    }
}

/// One managed render surface, drawn once per frame in priority order.
///
/// This is the seam to the graphics engine: the coordinator knows nothing
/// about scenes or materials, it only sequences these three calls.
pub trait RenderTarget: Send {
    /// Lower values draw first.
    fn priority(&self) -> i32 {
        0
    }

    /// Applies queued scene updates before the draw.
    fn apply_scene_updates(&mut self) {}

    /// Draws the scene.
    fn draw(&mut self);

    /// Runs after the draw (readbacks, overlays, swap bookkeeping).
    fn post_draw(&mut self) {}
}

/// Cooperative host-toolkit lock hooks.
///
/// Some commit logic must interact with host UI code that holds its own
/// lock; the coordinator releases that lock before such a commit and
/// reacquires it immediately after. Both hooks default to no-ops.
pub struct HostLockHooks {
    /// Releases the host lock held on behalf of the windowing toolkit.
    pub release: Box<dyn Fn() + Send>,
    /// Reacquires the host lock.
    pub acquire: Box<dyn Fn() + Send>,
}

impl Default for HostLockHooks {
    fn default() -> Self {
        Self {
            release: Box::new(|| {}),
            acquire: Box::new(|| {}),
        }
    }
}

/// The single thread performing draw passes, pacing, and commit execution.
///
/// Construct one per [`ProcessorManager`] and hand it to the thread that
/// owns the rendering context; [`FrameCoordinator::run`] loops until the
/// manager shuts down.
pub struct FrameCoordinator {
    shared: Arc<SchedulerShared>,
    targets: Vec<Box<dyn RenderTarget>>,
    host_lock: HostLockHooks,
    updates_rx: Receiver<StructuralUpdate>,
    updates_tx: Sender<StructuralUpdate>,
    frame_interval: Duration,
    fps_counter: FpsCounter,
    fps_observer: Option<Box<dyn FnMut(f64) + Send>>,
}

impl FrameCoordinator {
    /// Creates a coordinator bound to the manager's scheduler.
    pub fn new(manager: &ProcessorManager) -> Self {
        let (updates_tx, updates_rx) = channel();
        let config = manager.config();
        Self {
            shared: manager.shared(),
            targets: Vec::new(),
            host_lock: HostLockHooks::default(),
            updates_rx,
            updates_tx,
            frame_interval: config.frame_interval(),
            fps_counter: FpsCounter::new(config.fps_report_interval),
            fps_observer: None,
        }
    }

    /// Adds a render target, kept sorted by priority (lower draws first).
    pub fn add_render_target(&mut self, target: Box<dyn RenderTarget>) {
        self.targets.push(target);
        self.targets.sort_by_key(|t| t.priority());
    }

    /// Installs the cooperative host-toolkit lock hooks.
    pub fn set_host_lock_hooks(&mut self, hooks: HostLockHooks) {
        self.host_lock = hooks;
    }

    /// Installs an observer called with the measured FPS every reporting
    /// interval.
    pub fn set_fps_observer(&mut self, observer: Box<dyn FnMut(f64) + Send>) {
        self.fps_observer = Some(observer);
    }

    /// Returns a handle for queueing structural updates from any thread.
    pub fn update_sender(&self) -> StructuralUpdateSender {
        StructuralUpdateSender {
            sender: self.updates_tx.clone(),
        }
    }

    /// Runs the frame loop until the scheduler shuts down.
    ///
    /// Call this on the thread that owns the rendering context.
    pub fn run(mut self) {
        info!(
            "Frame coordinator running at {:.1} FPS target",
            1.0 / self.frame_interval.as_secs_f64()
        );
        while !self.shared.is_shutdown() {
            self.run_frame();
        }
        info!("Frame coordinator stopped");
    }

    /// Runs a single frame iteration, including the pacing sleep.
    ///
    /// Exposed for hosts that embed the coordinator into an existing event
    /// loop instead of giving it a dedicated thread.
    pub fn run_frame(&mut self) {
        let frame_start = Instant::now();

        self.apply_structural_updates();
        self.run_frame_affine_processors();

        for target in &mut self.targets {
            target.apply_scene_updates();
            target.draw();
            target.post_draw();
        }

        let render_time = frame_start.elapsed();
        let commit_budget = pacing::remaining_budget(self.frame_interval, render_time);
        trace!("Render took {render_time:?}, commit budget {commit_budget:?}");

        // The commit phase may overrun its budget; the overrun eats into the
        // next frame through the pacing sleep below.
        self.run_commit_phase();

        self.shared.trigger_new_frame();

        if let Some(fps) = self.fps_counter.frame_completed() {
            trace!("Measured {fps:.1} FPS");
            if let Some(observer) = &mut self.fps_observer {
                observer(fps);
            }
        }

        if let Some(sleep) = pacing::sleep_budget(self.frame_interval, frame_start.elapsed()) {
            std::thread::sleep(sleep);
        }
    }

    /// Applies every structural update queued since the last frame.
    fn apply_structural_updates(&mut self) {
        while let Ok(update) = self.updates_rx.try_recv() {
            update();
        }
    }

    /// Runs frame-affine processors inline: compute, then immediately
    /// commit, on this thread.
    ///
    /// These processors opted into synchronous single-threaded execution;
    /// there is no pool hop and no batching.
    fn run_frame_affine_processors(&mut self) {
        let units: Vec<Arc<ProcessorHandle>> =
            std::mem::take(&mut *self.shared.frame_affine.lock());
        for unit in units {
            let Some(trigger) = unit.fired_trigger() else {
                self.shared.signal_commit_complete(&unit);
                continue;
            };
            for_each_in_chain(&unit, |member| {
                let result = member.processor().compute(&trigger);
                if let Err(step_error) = result {
                    error!(
                        "Compute step of frame-affine processor {} failed: {step_error}",
                        member.id()
                    );
                }
            });
            for_each_in_chain(&unit, |member| self.commit_member(member, &trigger));
            self.shared.signal_commit_complete(&unit);
        }
    }

    /// Drains the commit handoff queue: every dispatched batch, in order.
    ///
    /// Within a batch, commits run in trigger order and a processor's chain
    /// commits back to back with no other processor interleaved. Completion
    /// is signaled per processor so the dispatch loop can re-arm the batch.
    fn run_commit_phase(&mut self) {
        loop {
            let Some(batch) = self.shared.commit_ready.lock().pop_front() else {
                break;
            };
            for unit in batch {
                if let Some(trigger) = unit.fired_trigger() {
                    for_each_in_chain(&unit, |member| self.commit_member(member, &trigger));
                }
                self.shared.signal_commit_complete(&unit);
            }
        }
    }

    /// Runs one processor's commit step, with the host-lock dance for
    /// externally-lockable processors.
    fn commit_member(&self, member: &Arc<ProcessorHandle>, trigger: &Trigger) {
        let lockable = member.is_externally_lockable();
        if lockable {
            (self.host_lock.release)();
        }
        let result = member.processor().commit(trigger);
        if lockable {
            (self.host_lock.acquire)();
        }
        if let Err(step_error) = result {
            error!(
                "Commit step of processor {} failed: {step_error}",
                member.id()
            );
        }
    }
}
