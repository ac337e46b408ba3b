//! Deterministic context over virtual time.
//!
//! A `LabContext` never spawns a thread. Submitted jobs and timers are queued
//! and run only when the test drives the context with
//! [`LabContext::run_until_idle`] or [`LabContext::advance`]. While driven,
//! the calling thread is bound to the lab so thread-affinity checks behave as
//! they would on a real context thread.
//!
//! Time only moves when the test advances it, so delays such as a retry
//! interval can be asserted exactly.

use crate::cx::{Executor, Scheduler, ThreadContext, registry};
use crate::error::{Error, ErrorKind, Result};
use crate::runtime::timer::{ScheduledTask, TimerHeap};
use crate::runtime::{Job, Scheduled};
use crate::time::{TimeSource, VirtualClock};
use crate::tracing_compat::trace;
use crate::types::{ContextId, Time};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// A manually driven context for deterministic tests.
pub struct LabContext {
    id: ContextId,
    this: Weak<Self>,
    clock: Arc<VirtualClock>,
    queue: Mutex<VecDeque<Job>>,
    timers: Mutex<TimerHeap>,
    blocked: AtomicBool,
    closed: AtomicBool,
}

impl LabContext {
    /// Creates a lab context starting at virtual time zero.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_clock(Arc::new(VirtualClock::new()))
    }

    /// Creates a lab context driven by a shared virtual clock.
    #[must_use]
    pub fn with_clock(clock: Arc<VirtualClock>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: ContextId::next(),
            this: this.clone(),
            clock,
            queue: Mutex::new(VecDeque::new()),
            timers: Mutex::new(TimerHeap::new()),
            blocked: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the lab's clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<VirtualClock> {
        &self.clock
    }

    /// Returns the current virtual time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.clock.now()
    }

    /// Returns the number of queued jobs.
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns the number of live timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        let mut timers = self.timers.lock();
        // Drop cancelled entries sitting at the front before counting.
        timers.peek_deadline();
        timers.len()
    }

    fn enter(&self) -> registry::BindingGuard {
        let handle: Weak<dyn ThreadContext> = self.this.clone();
        registry::enter(self.id, handle)
    }

    fn run_queued(&self) -> usize {
        let mut ran = 0;
        loop {
            if self.is_closed() {
                break;
            }
            let job = self.queue.lock().pop_front();
            let Some(job) = job else { break };
            job.run_contained();
            ran += 1;
        }
        ran
    }

    fn fire_due(&self) -> usize {
        let due = self.timers.lock().pop_expired(self.clock.now());
        let fired = due.len();
        for (deadline, task) in due {
            if self.is_closed() {
                task.cancel();
                continue;
            }
            if let Some((next, task)) = task.fire(deadline) {
                self.timers.lock().insert(next, task);
            }
        }
        fired
    }

    /// Runs queued jobs and due timers until neither remains.
    ///
    /// Returns the number of jobs and timer firings executed. Virtual time
    /// does not move.
    pub fn run_until_idle(&self) -> usize {
        let _binding = self.enter();
        let mut total = 0;
        loop {
            let ran = self.run_queued() + self.fire_due();
            if ran == 0 {
                break;
            }
            total += ran;
        }
        total
    }

    /// Advances virtual time by `by`, running everything that falls due.
    ///
    /// The clock stops at each intermediate timer deadline so work scheduled
    /// from inside a firing observes the time at which it ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.clock.now() + by;
        let mut total = self.run_until_idle();
        loop {
            let next = self.timers.lock().peek_deadline();
            match next {
                Some(deadline) if deadline <= target => {
                    self.clock.advance_to(deadline);
                    total += self.run_until_idle();
                }
                _ => break,
            }
        }
        self.clock.advance_to(target);
        total += self.run_until_idle();
        trace!(context = %self.id, now = %self.clock.now(), ran = total, "lab advanced");
        total
    }

    fn insert_timer(&self, delay: Duration, task: ScheduledTask) {
        let deadline = self.clock.now() + delay;
        self.timers.lock().insert(deadline, task);
        if self.is_closed() {
            let dropped = self.timers.lock().cancel_all();
            drop(dropped);
        }
    }
}

impl Executor for LabContext {
    fn execute(&self, job: Job) -> Result<()> {
        if self.is_closed() {
            return Err(Error::new(ErrorKind::ContextClosed)
                .with_message(format!("context {} is closed", self.id)));
        }
        self.queue.lock().push_back(job);
        Ok(())
    }
}

impl Scheduler for LabContext {
    fn schedule(&self, delay: Duration, job: Job) -> Scheduled {
        if self.is_closed() {
            return Scheduled::rejected();
        }
        let (task, handle) = ScheduledTask::once(job);
        self.insert_timer(delay, task);
        handle
    }

    fn schedule_at_fixed_rate(
        &self,
        initial_delay: Duration,
        period: Duration,
        work: Box<dyn FnMut() + Send>,
    ) -> Scheduled {
        if self.is_closed() {
            return Scheduled::rejected();
        }
        let (task, handle) = ScheduledTask::periodic(period, work);
        self.insert_timer(initial_delay, task);
        handle
    }
}

impl ThreadContext for LabContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }

    fn block(&self) {
        self.blocked.store(true, Ordering::Release);
    }

    fn unblock(&self) {
        self.blocked.store(false, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let timers = self.timers.lock().cancel_all();
        let jobs = std::mem::take(&mut *self.queue.lock());
        trace!(
            context = %self.id,
            cancelled_timers = timers.len(),
            discarded_jobs = jobs.len(),
            "lab closed"
        );
        // Dropping a job can resolve completions whose callbacks re-enter this context.
        drop(timers);
        drop(jobs);
    }
}

impl fmt::Debug for LabContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabContext")
            .field("id", &self.id)
            .field("now", &self.clock.now())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
