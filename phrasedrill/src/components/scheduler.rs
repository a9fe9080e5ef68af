//! Defines the deferred-callback scheduler that stands in for wall-clock timers.
//!
//! Time inside the engine only moves when the host reports it through
//! `Stimulus::Elapsed`. Every pending callback is a plain value keyed by a
//! `TaskId`; the owner keeps the id and revokes the task with `cancel`.

use crate::common::TaskId;
use slotmap::SlotMap;
use std::time::Duration;

#[doc(hidden)]
struct Pending<A> {
    due: Duration,
    sequence: u64,
    action: A,
}

/// A virtual-time queue of one-shot deferred actions.
pub struct Scheduler<A> {
    now: Duration,
    next_sequence: u64,
    tasks: SlotMap<TaskId, Pending<A>>,
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Scheduler<A> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_sequence: 0,
            tasks: SlotMap::with_key(),
        }
    }

    /// The virtual time elapsed since the scheduler was created.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Queues `action` to fire once `delay` has elapsed.
    pub fn schedule(&mut self, delay: Duration, action: A) -> TaskId {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.tasks.insert(Pending {
            due: self.now + delay,
            sequence,
            action,
        })
    }

    /// Revokes a pending task. Returns `true` if it had not fired yet.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.tasks.remove(id).is_some()
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// The absolute time of the earliest pending task.
    pub fn next_due(&self) -> Option<Duration> {
        self.tasks.values().map(|task| task.due).min()
    }

    /// Pops the earliest task due at or before `until`, moving the clock to it.
    ///
    /// Ties fire in scheduling order. Callers loop on this so that tasks
    /// scheduled by a firing task inside the same window also fire.
    pub fn pop_due(&mut self, until: Duration) -> Option<(TaskId, A)> {
        let (id, _) = self
            .tasks
            .iter()
            .filter(|(_, task)| task.due <= until)
            .min_by_key(|(_, task)| (task.due, task.sequence))?;
        let task = self.tasks.remove(id)?;
        self.now = self.now.max(task.due);
        Some((id, task.action))
    }

    /// Moves the clock forward to `until` once everything due has fired.
    pub fn settle(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }
}
