//! End-to-end tests driving a real scheduler, worker pool, and frame
//! coordinator through full trigger → compute → commit → re-arm cycles.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;

use frame_scheduler::{
    ArmingCondition, FrameCoordinator, HostLockHooks, InputListener, PostedEventCondition,
    Processor, ProcessorHandle, ProcessorManager, RenderTarget, SchedulerConfig, StepError,
    TimerCondition, Trigger,
};

type EventLog = Arc<Mutex<Vec<String>>>;

fn new_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Polls `cond` until it holds or the timeout passes.
fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        target_fps: 200,
        worker_count: Some(2),
        fps_report_interval: 0,
    }
}

/// A running scheduler + coordinator pair, torn down on drop.
struct Harness {
    manager: ProcessorManager,
    coordinator: Option<JoinHandle<()>>,
}

impl Harness {
    fn start() -> Self {
        Self::start_with(test_config(), |_| {})
    }

    fn start_with(
        config: SchedulerConfig,
        configure: impl FnOnce(&mut FrameCoordinator),
    ) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let manager = ProcessorManager::new(config);
        let mut coordinator = FrameCoordinator::new(&manager);
        configure(&mut coordinator);
        let coordinator = thread::spawn(move || coordinator.run());
        Self {
            manager,
            coordinator: Some(coordinator),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.manager.shutdown();
        if let Some(coordinator) = self.coordinator.take() {
            let _ = coordinator.join();
        }
    }
}

fn trigger_label(trigger: &Trigger) -> String {
    match trigger {
        Trigger::NewFrame { .. } => "NewFrame".to_owned(),
        Trigger::TimerElapsed { .. } => "Timer".to_owned(),
        Trigger::InputEvents(events) => format!("Input({})", events.len()),
        Trigger::PostedEvents(ids) => format!("Posted({})", ids.len()),
    }
}

/// A processor that logs its steps and checks that each commit observes the
/// value its own cycle's compute staged.
struct Recorder {
    label: &'static str,
    condition: Option<ArmingCondition>,
    log: EventLog,
    stale: Arc<AtomicBool>,
    staged: Option<u64>,
    cycle: u64,
    commit_gate: Option<Receiver<()>>,
}

impl Recorder {
    fn handle(
        label: &'static str,
        condition: Option<ArmingCondition>,
        log: &EventLog,
        stale: &Arc<AtomicBool>,
    ) -> Arc<ProcessorHandle> {
        ProcessorHandle::new(Box::new(Recorder {
            label,
            condition,
            log: Arc::clone(log),
            stale: Arc::clone(stale),
            staged: None,
            cycle: 0,
            commit_gate: None,
        }))
    }

    fn gated_handle(
        label: &'static str,
        condition: Option<ArmingCondition>,
        log: &EventLog,
        stale: &Arc<AtomicBool>,
    ) -> (Arc<ProcessorHandle>, Sender<()>) {
        let (gate_tx, gate_rx) = channel();
        let handle = ProcessorHandle::new(Box::new(Recorder {
            label,
            condition,
            log: Arc::clone(log),
            stale: Arc::clone(stale),
            staged: None,
            cycle: 0,
            commit_gate: Some(gate_rx),
        }));
        (handle, gate_tx)
    }
}

impl Processor for Recorder {
    fn name(&self) -> &str {
        self.label
    }

    fn initialize(&mut self) -> Option<ArmingCondition> {
        self.condition.take()
    }

    fn compute(&mut self, _trigger: &Trigger) -> Result<(), StepError> {
        self.staged = Some(self.cycle);
        self.log.lock().push(format!("{}:compute", self.label));
        Ok(())
    }

    fn commit(&mut self, trigger: &Trigger) -> Result<(), StepError> {
        self.log
            .lock()
            .push(format!("{}:commit:{}", self.label, trigger_label(trigger)));
        if let Some(gate) = &self.commit_gate {
            let _ = gate.recv_timeout(Duration::from_secs(5));
        }
        if self.staged != Some(self.cycle) {
            self.stale.store(true, Ordering::SeqCst);
        }
        self.staged = None;
        self.cycle += 1;
        Ok(())
    }
}

fn commit_count(log: &EventLog, label: &str) -> usize {
    let prefix = format!("{label}:commit");
    log.lock().iter().filter(|e| e.starts_with(&prefix)).count()
}

fn commit_positions(log: &EventLog, label: &str) -> Vec<usize> {
    let prefix = format!("{label}:commit");
    log.lock()
        .iter()
        .enumerate()
        .filter(|(_, e)| e.starts_with(&prefix))
        .map(|(i, _)| i)
        .collect()
}

#[test]
fn new_frame_processor_cycles_every_frame() {
    let harness = Harness::start();
    let log = new_log();
    let stale = Arc::new(AtomicBool::new(false));

    let handle = Recorder::handle("a", Some(ArmingCondition::NewFrame), &log, &stale);
    harness.manager.add_processor(&handle);

    assert!(wait_until(Duration::from_secs(5), || commit_count(&log, "a") >= 3));
    assert!(!stale.load(Ordering::SeqCst), "commit observed a stale compute result");

    // Every commit is preceded by its own cycle's compute.
    let entries = log.lock().clone();
    let computes = entries.iter().filter(|e| e.as_str() == "a:compute").count();
    let commits = entries
        .iter()
        .filter(|e| e.starts_with("a:commit"))
        .count();
    assert!(computes >= commits);
}

#[test]
fn commit_order_follows_trigger_order() {
    let harness = Harness::start();
    let log = new_log();
    let stale = Arc::new(AtomicBool::new(false));

    let posted = |id| {
        Some(ArmingCondition::PostedEvent(PostedEventCondition::new(
            vec![id],
        )))
    };
    let a = Recorder::handle("a", posted(9), &log, &stale);
    let b = Recorder::handle("b", posted(9), &log, &stale);
    harness.manager.add_processor(&a);
    harness.manager.add_processor(&b);

    for round in 1..=3 {
        // A post is only observed by armed conditions, so wait for the
        // previous cycle's re-arm before raising the next event.
        assert!(wait_until(Duration::from_secs(5), || {
            harness.manager.is_armed(&a) && harness.manager.is_armed(&b)
        }));
        harness.manager.post_event(9);
        assert!(wait_until(Duration::from_secs(5), || {
            commit_count(&log, "a") >= round && commit_count(&log, "b") >= round
        }));
    }

    let a_commits = commit_positions(&log, "a");
    let b_commits = commit_positions(&log, "b");
    assert_eq!(a_commits.len(), 3);
    assert_eq!(b_commits.len(), 3);
    for (a_pos, b_pos) in a_commits.iter().zip(&b_commits) {
        assert!(a_pos < b_pos, "a was registered first and must commit first");
    }
    assert!(!stale.load(Ordering::SeqCst));
}

#[test]
fn chain_commits_run_back_to_back() {
    let harness = Harness::start();
    let log = new_log();
    let stale = Arc::new(AtomicBool::new(false));

    let posted = |id| {
        Some(ArmingCondition::PostedEvent(PostedEventCondition::new(
            vec![id],
        )))
    };

    // head -> second -> third form a chain; sibling triggers on the same
    // event and must not interleave with the chain's commits.
    let head = Recorder::handle("head", posted(5), &log, &stale);
    let second = Recorder::handle("second", None, &log, &stale);
    let third = Recorder::handle("third", None, &log, &stale);
    second.set_next(Some(Arc::clone(&third)));
    head.set_next(Some(Arc::clone(&second)));
    let sibling = Recorder::handle("sibling", posted(5), &log, &stale);

    harness.manager.add_processor(&head);
    harness.manager.add_processor(&sibling);
    harness.manager.post_event(5);

    assert!(wait_until(Duration::from_secs(5), || {
        commit_count(&log, "third") >= 1 && commit_count(&log, "sibling") >= 1
    }));

    let entries = log.lock().clone();
    let commit_sequence: Vec<&str> = entries
        .iter()
        .filter(|e| e.contains(":commit"))
        .map(|e| e.split(':').next().unwrap())
        .collect();
    assert_eq!(commit_sequence, vec!["head", "second", "third", "sibling"]);
    assert!(!stale.load(Ordering::SeqCst));
}

#[test]
fn triggered_processor_leaves_armed_queues_until_commit_completes() {
    let harness = Harness::start();
    let log = new_log();
    let stale = Arc::new(AtomicBool::new(false));

    let condition = Some(ArmingCondition::PostedEvent(PostedEventCondition::new(
        vec![3],
    )));
    let (handle, gate) = Recorder::gated_handle("g", condition, &log, &stale);
    harness.manager.add_processor(&handle);
    assert!(harness.manager.is_armed(&handle));

    harness.manager.post_event(3);

    // The commit entry is logged before the gate blocks, so once it appears
    // the processor is mid-commit and must not be armed.
    assert!(wait_until(Duration::from_secs(5), || commit_count(&log, "g") >= 1));
    assert!(!harness.manager.is_armed(&handle));

    gate.send(()).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        harness.manager.is_armed(&handle)
    }));
}

#[test]
fn failing_compute_does_not_stall_siblings() {
    struct FailingCompute {
        condition: Option<ArmingCondition>,
        commits: Arc<AtomicUsize>,
    }

    impl Processor for FailingCompute {
        fn name(&self) -> &str {
            "failing"
        }

        fn initialize(&mut self) -> Option<ArmingCondition> {
            self.condition.take()
        }

        fn compute(&mut self, _trigger: &Trigger) -> Result<(), StepError> {
            Err("intentional failure".into())
        }

        fn commit(&mut self, _trigger: &Trigger) -> Result<(), StepError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let harness = Harness::start();
    let log = new_log();
    let stale = Arc::new(AtomicBool::new(false));
    let failing_commits = Arc::new(AtomicUsize::new(0));

    let failing = ProcessorHandle::new(Box::new(FailingCompute {
        condition: Some(ArmingCondition::PostedEvent(PostedEventCondition::new(
            vec![4],
        ))),
        commits: Arc::clone(&failing_commits),
    }));
    let sibling = Recorder::handle(
        "sibling",
        Some(ArmingCondition::PostedEvent(PostedEventCondition::new(
            vec![4],
        ))),
        &log,
        &stale,
    );
    harness.manager.add_processor(&failing);
    harness.manager.add_processor(&sibling);

    // Two rounds: the failing processor must also have been re-armed.
    for round in 1..=2 {
        assert!(wait_until(Duration::from_secs(5), || {
            harness.manager.is_armed(&failing) && harness.manager.is_armed(&sibling)
        }));
        harness.manager.post_event(4);
        assert!(wait_until(Duration::from_secs(5), || {
            commit_count(&log, "sibling") >= round
                && failing_commits.load(Ordering::SeqCst) >= round
        }));
    }
    assert!(!stale.load(Ordering::SeqCst));
}

#[test]
fn input_events_queued_before_arming_replay_immediately() {
    let harness = Harness::start();
    let log = new_log();
    let stale = Arc::new(AtomicBool::new(false));

    let listener = InputListener::new();
    listener.push(Arc::new("key-down".to_owned()));

    let handle = Recorder::handle(
        "late",
        Some(ArmingCondition::InputEvent(listener.clone())),
        &log,
        &stale,
    );
    harness.manager.add_processor(&handle);

    // No dispatch_external_event call: the queued event alone must trigger.
    assert!(wait_until(Duration::from_secs(5), || {
        log.lock().iter().any(|e| e == "late:commit:Input(1)")
    }));
}

#[test]
fn external_events_fan_out_to_every_armed_listener() {
    let harness = Harness::start();
    let log = new_log();
    let stale = Arc::new(AtomicBool::new(false));

    let a = Recorder::handle(
        "a",
        Some(ArmingCondition::InputEvent(InputListener::new())),
        &log,
        &stale,
    );
    let b = Recorder::handle(
        "b",
        Some(ArmingCondition::InputEvent(InputListener::new())),
        &log,
        &stale,
    );
    harness.manager.add_processor(&a);
    harness.manager.add_processor(&b);

    harness.manager.dispatch_external_event(Arc::new(17u32));

    assert!(wait_until(Duration::from_secs(5), || {
        commit_count(&log, "a") >= 1 && commit_count(&log, "b") >= 1
    }));
}

#[test]
fn collection_members_stay_eligible_after_unrelated_trigger() {
    let harness = Harness::start();
    let log = new_log();
    let stale = Arc::new(AtomicBool::new(false));

    let condition = ArmingCondition::Collection(vec![
        ArmingCondition::NewFrame,
        ArmingCondition::PostedEvent(PostedEventCondition::new(vec![7])),
    ]);
    let handle = Recorder::handle("c", Some(condition), &log, &stale);
    harness.manager.add_processor(&handle);

    // Let the new-frame member fire a few times first.
    assert!(wait_until(Duration::from_secs(5), || {
        log.lock()
            .iter()
            .filter(|e| e.as_str() == "c:commit:NewFrame")
            .count()
            >= 3
    }));

    // The posted-event member must fire too. The processor is briefly out
    // of the armed queues around each new-frame cycle, so keep posting
    // until a post lands in an armed window.
    assert!(wait_until(Duration::from_secs(5), || {
        harness.manager.post_event(7);
        log.lock().iter().any(|e| e.starts_with("c:commit:Posted"))
    }));
}

#[test]
fn timer_rearms_and_fires_repeatedly() {
    let harness = Harness::start();
    let log = new_log();
    let stale = Arc::new(AtomicBool::new(false));

    let condition = ArmingCondition::TimerElapsed(TimerCondition::new(Duration::from_millis(20)));
    let handle = Recorder::handle("t", Some(condition), &log, &stale);
    harness.manager.add_processor(&handle);

    assert!(wait_until(Duration::from_secs(5), || {
        log.lock()
            .iter()
            .filter(|e| e.as_str() == "t:commit:Timer")
            .count()
            >= 2
    }));
}

#[test]
fn disabled_processor_is_parked_with_events_pending() {
    let harness = Harness::start();
    let log = new_log();
    let stale = Arc::new(AtomicBool::new(false));

    let condition = Some(ArmingCondition::PostedEvent(PostedEventCondition::new(
        vec![8],
    )));
    let handle = Recorder::handle("p", condition, &log, &stale);
    harness.manager.add_processor(&handle);

    handle.set_enabled(false);
    harness.manager.post_event(8);

    thread::sleep(Duration::from_millis(100));
    assert_eq!(commit_count(&log, "p"), 0, "disabled processor must not run");
    assert!(
        harness.manager.is_armed(&handle),
        "disabled processor is parked, not disarmed"
    );

    // Re-enabling and posting again delivers both the parked and the new
    // event in one frozen snapshot.
    handle.set_enabled(true);
    harness.manager.post_event(8);
    assert!(wait_until(Duration::from_secs(5), || {
        log.lock().iter().any(|e| e == "p:commit:Posted(2)")
    }));
}

#[test]
fn removing_in_flight_frame_affine_processor_keeps_scheduling() {
    let config = SchedulerConfig {
        target_fps: 20,
        worker_count: Some(2),
        fps_report_interval: 0,
    };
    let harness = Harness::start_with(config, |_| {});
    let log = new_log();
    let stale = Arc::new(AtomicBool::new(false));

    let handle = Recorder::handle("fa", Some(ArmingCondition::NewFrame), &log, &stale);
    handle.set_frame_affine(true);
    harness.manager.add_processor(&handle);
    assert!(wait_until(Duration::from_secs(5), || commit_count(&log, "fa") >= 1));

    // Right after a commit, the next cycle has already been dispatched to
    // the coordinator's handoff list; remove the processor during the
    // pacing sleep, while it sits there undelivered.
    thread::sleep(Duration::from_millis(15));
    harness.manager.remove_processor(&handle);

    // The dispatch loop must still complete that batch and go on to
    // schedule other processors.
    let canary = Recorder::handle("canary", Some(ArmingCondition::NewFrame), &log, &stale);
    harness.manager.add_processor(&canary);
    assert!(wait_until(Duration::from_secs(5), || {
        commit_count(&log, "canary") >= 1
    }));
}

#[test]
fn concurrent_posts_and_frames_dispatch_once_per_cycle() {
    let config = SchedulerConfig {
        target_fps: 500,
        worker_count: Some(2),
        fps_report_interval: 0,
    };
    let harness = Harness::start_with(config, |_| {});
    let log = new_log();
    let stale = Arc::new(AtomicBool::new(false));

    let condition = ArmingCondition::Collection(vec![
        ArmingCondition::NewFrame,
        ArmingCondition::PostedEvent(PostedEventCondition::new(vec![11])),
    ]);
    let handle = Recorder::handle("r", Some(condition), &log, &stale);
    harness.manager.add_processor(&handle);

    // Hammer the posted-event pass from a producer thread while the frame
    // tick fires the collection's other member every frame. A double
    // dispatch would run two commits against one staged compute result and
    // trip the stale flag.
    let stop = Arc::new(AtomicBool::new(false));
    let manager = &harness.manager;
    thread::scope(|scope| {
        let producer_stop = Arc::clone(&stop);
        scope.spawn(move || {
            while !producer_stop.load(Ordering::SeqCst) {
                manager.post_event(11);
                thread::yield_now();
            }
        });
        assert!(wait_until(Duration::from_secs(5), || {
            commit_count(&log, "r") >= 100
        }));
        stop.store(true, Ordering::SeqCst);
    });
    assert!(
        !stale.load(Ordering::SeqCst),
        "a commit observed another cycle's compute result"
    );
}

#[test]
fn collection_timer_fires_despite_frame_rearms() {
    let harness = Harness::start();
    let log = new_log();
    let stale = Arc::new(AtomicBool::new(false));

    // The new-frame member re-arms the whole collection every cycle; the
    // timer's deadline must survive those re-arms and fire once elapsed.
    let condition = ArmingCondition::Collection(vec![
        ArmingCondition::NewFrame,
        ArmingCondition::TimerElapsed(TimerCondition::new(Duration::from_millis(50))),
    ]);
    let handle = Recorder::handle("ct", Some(condition), &log, &stale);
    harness.manager.add_processor(&handle);

    assert!(wait_until(Duration::from_secs(5), || {
        log.lock().iter().any(|e| e == "ct:commit:Timer")
    }));
}

#[test]
fn deregistered_processor_stops_cycling() {
    let harness = Harness::start();
    let log = new_log();
    let stale = Arc::new(AtomicBool::new(false));

    let handle = Recorder::handle("d", Some(ArmingCondition::NewFrame), &log, &stale);
    harness.manager.add_processor(&handle);
    assert!(wait_until(Duration::from_secs(5), || commit_count(&log, "d") >= 1));

    harness.manager.remove_processor(&handle);
    assert!(!harness.manager.is_armed(&handle));

    // Allow any in-flight cycle to drain, then check the count is stable.
    thread::sleep(Duration::from_millis(100));
    let settled = commit_count(&log, "d");
    thread::sleep(Duration::from_millis(100));
    assert_eq!(commit_count(&log, "d"), settled);
}

/// Records the thread every step ran on, for affinity checks.
struct ThreadRecorder {
    condition: Option<ArmingCondition>,
    threads: Arc<Mutex<Vec<ThreadId>>>,
}

impl Processor for ThreadRecorder {
    fn initialize(&mut self) -> Option<ArmingCondition> {
        self.condition.take()
    }

    fn compute(&mut self, _trigger: &Trigger) -> Result<(), StepError> {
        self.threads.lock().push(thread::current().id());
        Ok(())
    }

    fn commit(&mut self, _trigger: &Trigger) -> Result<(), StepError> {
        self.threads.lock().push(thread::current().id());
        Ok(())
    }
}

/// A render target that counts draws and records its thread.
struct CountingTarget {
    draws: Arc<AtomicUsize>,
    draw_thread: Arc<Mutex<Option<ThreadId>>>,
}

impl RenderTarget for CountingTarget {
    fn draw(&mut self) {
        self.draws.fetch_add(1, Ordering::SeqCst);
        *self.draw_thread.lock() = Some(thread::current().id());
    }
}

#[test]
fn frame_affine_processor_runs_on_the_frame_thread() {
    let draws = Arc::new(AtomicUsize::new(0));
    let draw_thread = Arc::new(Mutex::new(None));
    let target = CountingTarget {
        draws: Arc::clone(&draws),
        draw_thread: Arc::clone(&draw_thread),
    };
    let harness = Harness::start_with(test_config(), |coordinator| {
        coordinator.add_render_target(Box::new(target));
    });

    let threads = Arc::new(Mutex::new(Vec::new()));
    let handle = ProcessorHandle::new(Box::new(ThreadRecorder {
        condition: Some(ArmingCondition::NewFrame),
        threads: Arc::clone(&threads),
    }));
    handle.set_frame_affine(true);
    harness.manager.add_processor(&handle);

    assert!(wait_until(Duration::from_secs(5), || threads.lock().len() >= 4));
    assert!(draws.load(Ordering::SeqCst) >= 1);

    let frame_thread = draw_thread.lock().expect("the target has drawn");
    for step_thread in threads.lock().iter() {
        assert_eq!(
            *step_thread, frame_thread,
            "frame-affine steps must run on the draw thread"
        );
    }
}

#[test]
fn pooled_compute_runs_off_the_frame_thread() {
    let draws = Arc::new(AtomicUsize::new(0));
    let draw_thread = Arc::new(Mutex::new(None));
    let target = CountingTarget {
        draws: Arc::clone(&draws),
        draw_thread: Arc::clone(&draw_thread),
    };
    let harness = Harness::start_with(test_config(), |coordinator| {
        coordinator.add_render_target(Box::new(target));
    });

    let threads = Arc::new(Mutex::new(Vec::new()));
    let handle = ProcessorHandle::new(Box::new(ThreadRecorder {
        condition: Some(ArmingCondition::NewFrame),
        threads: Arc::clone(&threads),
    }));
    harness.manager.add_processor(&handle);

    // Entries alternate compute, commit, compute, commit, ...
    assert!(wait_until(Duration::from_secs(5), || threads.lock().len() >= 4));
    let frame_thread = draw_thread.lock().expect("the target has drawn");
    let recorded = threads.lock().clone();
    assert_ne!(recorded[0], frame_thread, "compute runs on a worker");
    assert_eq!(recorded[1], frame_thread, "commit runs on the frame thread");
}

#[test]
fn externally_lockable_commit_is_wrapped_by_host_lock_hooks() {
    let log = new_log();
    let stale = Arc::new(AtomicBool::new(false));

    let hook_log = Arc::clone(&log);
    let release_log = Arc::clone(&log);
    let harness = Harness::start_with(test_config(), move |coordinator| {
        coordinator.set_host_lock_hooks(HostLockHooks {
            release: Box::new(move || release_log.lock().push("host:release".to_owned())),
            acquire: Box::new(move || hook_log.lock().push("host:acquire".to_owned())),
        });
    });

    let condition = Some(ArmingCondition::PostedEvent(PostedEventCondition::new(
        vec![6],
    )));
    let handle = Recorder::handle("l", condition, &log, &stale);
    handle.set_externally_lockable(true);
    harness.manager.add_processor(&handle);
    harness.manager.post_event(6);

    assert!(wait_until(Duration::from_secs(5), || {
        log.lock().iter().any(|e| e == "host:acquire")
    }));

    let entries = log.lock().clone();
    let release = entries.iter().position(|e| e == "host:release").unwrap();
    let commit = entries
        .iter()
        .position(|e| e.starts_with("l:commit"))
        .unwrap();
    let acquire = entries.iter().position(|e| e == "host:acquire").unwrap();
    assert!(release < commit && commit < acquire);
}

#[test]
fn structural_updates_run_on_the_frame_thread() {
    let draws = Arc::new(AtomicUsize::new(0));
    let draw_thread = Arc::new(Mutex::new(None));
    let target = CountingTarget {
        draws: Arc::clone(&draws),
        draw_thread: Arc::clone(&draw_thread),
    };

    let manager = ProcessorManager::new(test_config());
    let mut coordinator = FrameCoordinator::new(&manager);
    coordinator.add_render_target(Box::new(target));
    let updates = coordinator.update_sender();
    let coordinator = thread::spawn(move || coordinator.run());

    let applied_on = Arc::new(Mutex::new(None));
    let applied_clone = Arc::clone(&applied_on);
    updates.send(Box::new(move || {
        *applied_clone.lock() = Some(thread::current().id());
    }));

    assert!(wait_until(Duration::from_secs(5), || applied_on.lock().is_some()));
    let frame_thread = draw_thread.lock().expect("the target has drawn");
    assert_eq!(applied_on.lock().unwrap(), frame_thread);

    manager.shutdown();
    let _ = coordinator.join();
}

#[test]
fn fps_observer_receives_reports() {
    let config = SchedulerConfig {
        target_fps: 200,
        worker_count: Some(2),
        fps_report_interval: 10,
    };
    let reports = Arc::new(AtomicUsize::new(0));
    let observer_reports = Arc::clone(&reports);
    let harness = Harness::start_with(config, move |coordinator| {
        coordinator.set_fps_observer(Box::new(move |fps| {
            assert!(fps > 0.0);
            observer_reports.fetch_add(1, Ordering::SeqCst);
        }));
    });

    assert!(wait_until(Duration::from_secs(5), || {
        reports.load(Ordering::SeqCst) >= 2
    }));
    drop(harness);
}
