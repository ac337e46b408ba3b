//! Timer heap for delayed and periodic work.
//!
//! This module provides a min-heap of `(deadline, task)` pairs. Each context
//! owns one heap; its loop pops expired entries, runs them outside the heap
//! lock, and reinserts periodic entries at their next fixed-rate deadline.
//!
//! Cancellation is lazy: a cancelled entry stays in the heap until it reaches
//! the front and is discarded on pop.

use crate::runtime::stored_task::{Job, panic_message};
use crate::time::driver::duration_to_nanos_saturating;
use crate::tracing_compat::error;
use crate::types::Time;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Cancellable handle to scheduled work.
///
/// Handles are cheap to clone; every clone controls the same task.
#[derive(Debug, Clone, Default)]
pub struct Scheduled {
    cancelled: Arc<AtomicBool>,
}

impl Scheduled {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A handle for work that was never accepted (e.g. the context is closed).
    pub(crate) fn rejected() -> Self {
        let handle = Self::new();
        handle.cancel();
        handle
    }

    /// Cancels the task.
    ///
    /// A one-shot task cancelled before its deadline never runs. A periodic
    /// task stops after the firing in progress, if any. Returns `true` if this
    /// call performed the cancellation.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    /// Returns true once the task has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

enum TaskKind {
    Once(Job),
    Periodic {
        period: Duration,
        work: Box<dyn FnMut() + Send>,
    },
}

/// A pending delayed or periodic invocation.
pub(crate) struct ScheduledTask {
    handle: Scheduled,
    kind: TaskKind,
}

impl ScheduledTask {
    pub(crate) fn once(job: Job) -> (Self, Scheduled) {
        let handle = Scheduled::new();
        let task = Self {
            handle: handle.clone(),
            kind: TaskKind::Once(job),
        };
        (task, handle)
    }

    /// A zero period is clamped to one nanosecond so the heap always advances.
    pub(crate) fn periodic(period: Duration, work: Box<dyn FnMut() + Send>) -> (Self, Scheduled) {
        let handle = Scheduled::new();
        let task = Self {
            handle: handle.clone(),
            kind: TaskKind::Periodic {
                period: period.max(Duration::from_nanos(1)),
                work,
            },
        };
        (task, handle)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    pub(crate) fn cancel(&self) {
        self.handle.cancel();
    }

    /// Fires the task scheduled for `deadline`.
    ///
    /// Returns the task and its next deadline if it must be reinserted.
    pub(crate) fn fire(self, deadline: Time) -> Option<(Time, Self)> {
        if self.is_cancelled() {
            return None;
        }
        match self.kind {
            TaskKind::Once(job) => {
                job.run_contained();
                None
            }
            TaskKind::Periodic { period, mut work } => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(&mut work)) {
                    let message = panic_message(payload.as_ref());
                    error!(panic = %message, "periodic task panicked");
                    let _ = &message;
                }
                if self.handle.is_cancelled() {
                    return None;
                }
                let next = deadline.saturating_add_nanos(duration_to_nanos_saturating(period));
                Some((
                    next,
                    Self {
                        handle: self.handle,
                        kind: TaskKind::Periodic { period, work },
                    },
                ))
            }
        }
    }
}

struct TimerEntry {
    deadline: Time,
    generation: u64,
    task: ScheduledTask,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Eq for TimerEntry {}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse ordering for min-heap (earliest deadline first, then FIFO).
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of scheduled tasks ordered by deadline.
#[derive(Default)]
pub(crate) struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    next_generation: u64,
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries, including cancelled ones not yet popped.
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub(crate) fn insert(&mut self, deadline: Time, task: ScheduledTask) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.heap.push(TimerEntry {
            deadline,
            generation,
            task,
        });
    }

    /// Returns the earliest live deadline, discarding cancelled entries at the front.
    pub(crate) fn peek_deadline(&mut self) -> Option<Time> {
        while let Some(entry) = self.heap.peek() {
            if entry.task.is_cancelled() {
                self.heap.pop();
            } else {
                return Some(entry.deadline);
            }
        }
        None
    }

    /// Pops all live tasks whose deadline is `<= now`, earliest first.
    pub(crate) fn pop_expired(&mut self, now: Time) -> Vec<(Time, ScheduledTask)> {
        let mut expired = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }
            let Some(entry) = self.heap.pop() else {
                break;
            };
            if !entry.task.is_cancelled() {
                expired.push((entry.deadline, entry.task));
            }
        }
        expired
    }

    /// Cancels every pending task and removes it from the heap.
    ///
    /// The tasks are handed back so the caller can drop them after releasing
    /// the heap lock; dropping a task may run arbitrary destructors.
    #[must_use = "dropping the drained tasks under the heap lock can deadlock"]
    pub(crate) fn cancel_all(&mut self) -> Vec<ScheduledTask> {
        self.heap
            .drain()
            .map(|entry| {
                entry.task.cancel();
                entry.task
            })
            .collect()
    }
}

impl std::fmt::Debug for TimerHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHeap")
            .field("len", &self.heap.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording(log: &Arc<Mutex<Vec<u32>>>, n: u32) -> Job {
        let log = Arc::clone(log);
        Job::new(move || log.lock().push(n))
    }

    #[test]
    fn empty_heap_has_no_deadline() {
        let mut heap = TimerHeap::new();
        assert!(heap.is_empty());
        assert_eq!(heap.peek_deadline(), None);
    }

    #[test]
    fn pop_expired_returns_due_tasks_in_deadline_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut heap = TimerHeap::new();
        for (n, ms) in [(1, 100), (2, 200), (3, 50)] {
            let (task, _) = ScheduledTask::once(recording(&log, n));
            heap.insert(Time::from_millis(ms), task);
        }

        let expired = heap.pop_expired(Time::from_millis(125));
        assert_eq!(expired.len(), 2);
        for (deadline, task) in expired {
            assert!(task.fire(deadline).is_none());
        }
        assert_eq!(*log.lock(), vec![3, 1]);
        assert_eq!(heap.peek_deadline(), Some(Time::from_millis(200)));
    }

    #[test]
    fn equal_deadlines_fire_in_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut heap = TimerHeap::new();
        for n in 0..5 {
            let (task, _) = ScheduledTask::once(recording(&log, n));
            heap.insert(Time::from_millis(10), task);
        }
        for (deadline, task) in heap.pop_expired(Time::from_millis(10)) {
            task.fire(deadline);
        }
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn cancelled_tasks_are_discarded() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut heap = TimerHeap::new();
        let (task, handle) = ScheduledTask::once(recording(&log, 1));
        heap.insert(Time::from_millis(5), task);
        assert!(handle.cancel());
        assert!(!handle.cancel());

        assert_eq!(heap.peek_deadline(), None);
        assert!(heap.pop_expired(Time::from_secs(1)).is_empty());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn periodic_task_reschedules_at_fixed_rate() {
        let count = Arc::new(Mutex::new(0));
        let count_clone = Arc::clone(&count);
        let (task, handle) = ScheduledTask::periodic(
            Duration::from_millis(10),
            Box::new(move || *count_clone.lock() += 1),
        );

        let (next, task) = task.fire(Time::from_millis(5)).expect("periodic reinserts");
        assert_eq!(next, Time::from_millis(15));
        handle.cancel();
        assert!(task.fire(next).is_none());
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn cancel_all_cancels_handles() {
        let mut heap = TimerHeap::new();
        let (task, handle) = ScheduledTask::once(Job::new(|| {}));
        heap.insert(Time::from_millis(1), task);
        let drained = heap.cancel_all();
        assert_eq!(drained.len(), 1);
        assert!(drained[0].is_cancelled());
        assert!(handle.is_cancelled());
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn rejected_handle_is_cancelled() {
        assert!(Scheduled::rejected().is_cancelled());
    }
}
