//! # Arming Conditions
//!
//! This module defines the predicate objects that describe *when* a processor
//! becomes eligible to run:
//! - `ArmingCondition` - A recursive tagged union of the condition kinds
//! - `InputListener` - A shared queue handle fed by the host input system
//! - `PostedEventCondition` - Pending/frozen bookkeeping for posted events
//! - `Trigger` - A record of which concrete condition fired, with its payload
//!
//! A condition is stateless with respect to scheduling except for its
//! pending-event bookkeeping: input listeners buffer host events and posted
//! event conditions buffer event identifiers until a trigger pass freezes
//! them. Collections compose conditions so a single processor can be armed on
//! several kinds at once; [`ArmingCondition::find`] locates the first member
//! of a given kind inside a possibly nested collection.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use web_time::{Duration, Instant};

/// Identifier for a posted user event.
pub type EventId = u64;

/// An opaque external-input event payload.
///
/// The host input system decides what this actually is; processors downcast
/// it in their compute step. Events are reference counted so a single host
/// event can fan out to every armed listener without copying the payload.
pub type InputEvent = Arc<dyn Any + Send + Sync>;

/// Discriminant for the condition kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionKind {
    /// Fires once per frame coordinator tick.
    NewFrame,
    /// Fires once a configured duration has elapsed.
    TimerElapsed,
    /// Fires when the associated input listener has queued events.
    InputEvent,
    /// Fires when a matching user event has been posted.
    PostedEvent,
    /// An ordered, possibly nested group of conditions.
    Collection,
}

/// A predicate describing when a processor becomes eligible to run.
///
/// Leaf variants carry their own pending-event state; the `Collection`
/// variant composes members so arming, disarming and lookup recurse into
/// them. A processor owns exactly one condition, installed once when it is
/// registered with the scheduler.
pub enum ArmingCondition {
    /// Eligible on the next frame tick.
    NewFrame,
    /// Eligible once the configured interval has elapsed.
    TimerElapsed(TimerCondition),
    /// Eligible when the listener has at least one queued event.
    InputEvent(InputListener),
    /// Eligible when one of a fixed set of event identifiers is posted.
    PostedEvent(PostedEventCondition),
    /// An ordered group of conditions, any of which may fire.
    Collection(Vec<ArmingCondition>),
}

impl ArmingCondition {
    /// Returns the discriminant of this condition.
    pub fn kind(&self) -> ConditionKind {
        match self {
            ArmingCondition::NewFrame => ConditionKind::NewFrame,
            ArmingCondition::TimerElapsed(_) => ConditionKind::TimerElapsed,
            ArmingCondition::InputEvent(_) => ConditionKind::InputEvent,
            ArmingCondition::PostedEvent(_) => ConditionKind::PostedEvent,
            ArmingCondition::Collection(_) => ConditionKind::Collection,
        }
    }

    /// Finds the first condition of the given kind, depth first.
    ///
    /// A leaf matches itself; a collection is searched member by member in
    /// order, recursing into nested collections.
    ///
    /// # Arguments
    ///
    /// * `kind` - The condition kind to look for
    ///
    /// # Returns
    ///
    /// The first matching condition, or `None` if the kind does not occur.
    pub fn find(&self, kind: ConditionKind) -> Option<&ArmingCondition> {
        if self.kind() == kind {
            return Some(self);
        }
        if let ArmingCondition::Collection(members) = self {
            for member in members {
                if let Some(found) = member.find(kind) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Visits every leaf condition, recursing into collections.
    pub(crate) fn for_each_leaf(&self, f: &mut impl FnMut(&ArmingCondition)) {
        match self {
            ArmingCondition::Collection(members) => {
                for member in members {
                    member.for_each_leaf(f);
                }
            }
            leaf => f(leaf),
        }
    }

    /// Clears any pending-event state held by this condition's leaves.
    ///
    /// Called when a processor is disarmed: input queues are drained so a
    /// later re-arm starts clean, and any frozen posted-event snapshot is
    /// discarded without being processed.
    pub(crate) fn reset_pending(&self) {
        self.for_each_leaf(&mut |leaf| match leaf {
            ArmingCondition::InputEvent(listener) => {
                listener.drain();
            }
            ArmingCondition::PostedEvent(posted) => {
                posted.unfreeze();
                posted.clear_pending();
            }
            ArmingCondition::TimerElapsed(timer) => timer.clear_deadline(),
            _ => {}
        });
    }
}

impl fmt::Debug for ArmingCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArmingCondition::NewFrame => write!(f, "NewFrame"),
            ArmingCondition::TimerElapsed(timer) => {
                write!(f, "TimerElapsed({:?})", timer.interval())
            }
            ArmingCondition::InputEvent(listener) => {
                write!(f, "InputEvent(pending: {})", listener.pending_count())
            }
            ArmingCondition::PostedEvent(posted) => {
                write!(f, "PostedEvent({:?})", posted.ids())
            }
            ArmingCondition::Collection(members) => {
                f.debug_list().entries(members.iter()).finish()
            }
        }
    }
}

/// A timer condition that fires once its interval has elapsed.
///
/// The absolute deadline is set the first time the condition is armed and
/// kept until the timer fires, so a collection re-armed every cycle by
/// another member (a new-frame sibling, say) does not restart the countdown.
/// Once the timer fires, the next arm starts a fresh interval.
#[derive(Debug)]
pub struct TimerCondition {
    interval: Duration,
    deadline: Mutex<Option<Instant>>,
}

impl TimerCondition {
    /// Creates a timer condition with the given interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: Mutex::new(None),
        }
    }

    /// Returns the configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the deadline to arm against, setting `now + interval` only
    /// when no unexpired deadline is stored.
    pub(crate) fn arm_deadline(&self, now: Instant) -> Instant {
        let mut deadline = self.deadline.lock();
        *deadline.get_or_insert(now + self.interval)
    }

    /// Discards the stored deadline after the timer fires or disarms.
    pub(crate) fn clear_deadline(&self) {
        *self.deadline.lock() = None;
    }
}

/// A shared handle over a queue of external-input events.
///
/// The host input system pushes events into the listener from its own
/// thread; the scheduler drains the queue when the owning processor
/// triggers. Cloning the listener clones the handle, not the queue, so the
/// same listener can be given to the host plumbing and embedded in a
/// condition.
#[derive(Clone, Default)]
pub struct InputListener {
    queue: Arc<Mutex<VecDeque<InputEvent>>>,
}

impl InputListener {
    /// Creates a listener with an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an event on this listener.
    ///
    /// Safe to call from any thread.
    pub fn push(&self, event: InputEvent) {
        self.queue.lock().push_back(event);
    }

    /// Returns `true` if the listener has at least one queued event.
    ///
    /// A processor arming a condition over a listener that already has
    /// pending events is triggered immediately instead of waiting for the
    /// next unrelated event.
    pub fn has_pending(&self) -> bool {
        !self.queue.lock().is_empty()
    }

    /// Returns the number of queued events.
    pub fn pending_count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Removes and returns every queued event.
    pub fn drain(&self) -> Vec<InputEvent> {
        self.queue.lock().drain(..).collect()
    }
}

impl fmt::Debug for InputListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputListener")
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Pending/frozen bookkeeping for a posted-event condition.
///
/// Posted identifiers accumulate in the pending set until a trigger pass
/// freezes them: the pending set is atomically snapshotted into the frozen
/// slot and cleared, and the snapshot becomes the trigger payload. Disarming
/// unfreezes, discarding the snapshot without processing it.
#[derive(Debug)]
pub struct PostedEventCondition {
    ids: Vec<EventId>,
    pending: Mutex<Vec<EventId>>,
    frozen: Mutex<Vec<EventId>>,
}

impl PostedEventCondition {
    /// Creates a condition matching the given set of event identifiers.
    pub fn new(ids: Vec<EventId>) -> Self {
        Self {
            ids,
            pending: Mutex::new(Vec::new()),
            frozen: Mutex::new(Vec::new()),
        }
    }

    /// Returns the identifier set this condition matches.
    pub fn ids(&self) -> &[EventId] {
        &self.ids
    }

    /// Returns `true` if `id` belongs to this condition's identifier set.
    pub fn matches(&self, id: EventId) -> bool {
        self.ids.contains(&id)
    }

    /// Records a posted identifier in the pending set.
    pub fn post(&self, id: EventId) {
        self.pending.lock().push(id);
    }

    /// Returns `true` if identifiers have been posted since the last freeze.
    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Atomically snapshots and clears the pending set.
    ///
    /// The snapshot is retained in the frozen slot until the triggering pass
    /// completes (or the condition is unfrozen), and a copy is returned for
    /// the trigger payload.
    pub fn freeze(&self) -> Vec<EventId> {
        let snapshot = std::mem::take(&mut *self.pending.lock());
        *self.frozen.lock() = snapshot.clone();
        snapshot
    }

    /// Discards a frozen snapshot without processing it.
    pub fn unfreeze(&self) {
        self.frozen.lock().clear();
    }

    /// Clears the pending set without freezing it.
    pub(crate) fn clear_pending(&self) {
        self.pending.lock().clear();
    }
}

/// A record of which concrete condition fired for a processor.
///
/// A processor armed through a collection may be eligible on several kinds
/// at once; the trigger pass records the kind that actually fired, together
/// with its payload, and hands it to both the compute and the commit step of
/// the same cycle. The record is cleared after the commit step completes.
#[derive(Clone)]
pub enum Trigger {
    /// A frame tick fired, carrying the frame counter value.
    NewFrame {
        /// The coordinator's frame counter at the time of the tick.
        frame: u64,
    },
    /// A timer elapsed.
    TimerElapsed {
        /// The interval that was configured on the timer.
        interval: Duration,
    },
    /// An input listener had queued events; the queue was drained into the
    /// payload at trigger time.
    InputEvents(Vec<InputEvent>),
    /// Posted events matched; the pending set was frozen into the payload.
    PostedEvents(Vec<EventId>),
}

impl Trigger {
    /// Returns the kind of condition that fired.
    pub fn kind(&self) -> ConditionKind {
        match self {
            Trigger::NewFrame { .. } => ConditionKind::NewFrame,
            Trigger::TimerElapsed { .. } => ConditionKind::TimerElapsed,
            Trigger::InputEvents(_) => ConditionKind::InputEvent,
            Trigger::PostedEvents(_) => ConditionKind::PostedEvent,
        }
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::NewFrame { frame } => write!(f, "NewFrame({frame})"),
            Trigger::TimerElapsed { interval } => write!(f, "TimerElapsed({interval:?})"),
            Trigger::InputEvents(events) => write!(f, "InputEvents(len: {})", events.len()),
            Trigger::PostedEvents(ids) => write!(f, "PostedEvents({ids:?})"),
        }
    }
}
