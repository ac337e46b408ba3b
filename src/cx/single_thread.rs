//! A context backed by a dedicated OS thread.
//!
//! The thread runs a small event loop:
//!
//! ```text
//! loop {
//!     run the jobs queued when the pass started (FIFO)
//!     fire every timer whose deadline has passed
//!     park until the next deadline, or until new work arrives
//! }
//! ```
//!
//! Submission never takes the timer lock: jobs go through a lock-free queue
//! and the submitter unparks the loop. Timers and jobs run outside every lock
//! so they may freely submit or schedule more work on the same context.

use crate::config::ContextConfig;
use crate::cx::{Executor, Scheduler, ThreadContext, registry};
use crate::error::{Error, ErrorKind, Result};
use crate::runtime::timer::{ScheduledTask, TimerHeap};
use crate::runtime::{Job, JobQueue, Scheduled};
use crate::time::{TimeSource, WallClock};
use crate::tracing_compat::{debug, error, warn};
use crate::types::{ContextId, Time};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

struct Shared {
    id: ContextId,
    name: String,
    queue: JobQueue,
    timers: Mutex<TimerHeap>,
    clock: WallClock,
    blocked: AtomicBool,
    closed: AtomicBool,
    thread: OnceLock<Thread>,
}

impl Shared {
    fn wake(&self) {
        if let Some(thread) = self.thread.get() {
            thread.unpark();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn run(&self, handle: Weak<dyn ThreadContext>) {
        let _binding = registry::attach(self.id, handle);
        debug!(context = %self.id, name = %self.name, "context thread started");

        while !self.is_closed() {
            let batch = self.queue.len();
            for _ in 0..batch {
                if self.is_closed() {
                    break;
                }
                match self.queue.pop() {
                    Some(job) => {
                        job.run_contained();
                    }
                    None => break,
                }
            }

            self.fire_due_timers();

            if self.is_closed() || !self.queue.is_empty() {
                continue;
            }
            let next = self.timers.lock().peek_deadline();
            match next {
                Some(deadline) => {
                    let now = self.clock.now();
                    if deadline > now {
                        thread::park_timeout(deadline.duration_since(now));
                    }
                }
                None => thread::park(),
            }
        }

        let discarded = self.queue.discard_all();
        let cancelled = self.timers.lock().cancel_all();
        debug!(
            context = %self.id,
            discarded_jobs = discarded,
            cancelled_timers = cancelled.len(),
            "context thread stopped"
        );
        let _ = discarded;
        drop(cancelled);
    }

    fn insert_timer(&self, deadline: Time, task: ScheduledTask) {
        self.timers.lock().insert(deadline, task);
        if self.is_closed() {
            // `close` may have drained the heap before this insert landed.
            let dropped = self.timers.lock().cancel_all();
            drop(dropped);
        } else {
            self.wake();
        }
    }

    fn fire_due_timers(&self) {
        let now = self.clock.now();
        let due = self.timers.lock().pop_expired(now);
        for (deadline, task) in due {
            if self.is_closed() {
                task.cancel();
                continue;
            }
            if let Some((next, task)) = task.fire(deadline) {
                self.timers.lock().insert(next, task);
            }
        }
    }
}

/// A thread context that owns one dedicated OS thread.
///
/// Created behind an `Arc`; dropping the last handle closes the context.
///
/// # Example
///
/// ```
/// use threadcx::cx::{ExecutorExt, SingleThreadContext, ThreadContext};
/// use std::sync::mpsc;
///
/// let cx = SingleThreadContext::new("worker").unwrap();
/// let (tx, rx) = mpsc::channel();
/// let inner = cx.clone();
/// cx.submit(move || tx.send(inner.check_thread().is_ok()).unwrap()).unwrap();
/// assert!(rx.recv().unwrap());
/// cx.close();
/// ```
pub struct SingleThreadContext {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SingleThreadContext {
    /// Spawns a context thread with the given name.
    pub fn new(name: impl Into<String>) -> Result<Arc<Self>> {
        let name = name.into();
        let shared = Arc::new(Shared {
            id: ContextId::next(),
            name: name.clone(),
            queue: JobQueue::new(),
            timers: Mutex::new(TimerHeap::new()),
            clock: WallClock::new(),
            blocked: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            thread: OnceLock::new(),
        });
        let context = Arc::new(Self {
            shared: Arc::clone(&shared),
            worker: Mutex::new(None),
        });

        let weak = Arc::downgrade(&context);
        let handle: Weak<dyn ThreadContext> = weak;
        let loop_state = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || loop_state.run(handle))
            .map_err(|e| {
                Error::new(ErrorKind::Internal)
                    .with_message(format!("failed to spawn context thread {name}"))
                    .with_source(e)
            })?;

        let _ = shared.thread.set(worker.thread().clone());
        *context.worker.lock() = Some(worker);
        Ok(context)
    }

    /// Spawns a context thread named after the configured prefix.
    pub fn with_config(config: &ContextConfig) -> Result<Arc<Self>> {
        Self::new(config.thread_name_prefix.clone())
    }

    /// Returns the context thread's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns the number of jobs waiting to run.
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.shared.queue.len()
    }
}

impl Executor for SingleThreadContext {
    fn execute(&self, job: Job) -> Result<()> {
        if self.shared.is_closed() {
            warn!(context = %self.shared.id, "rejected job submitted to closed context");
            return Err(Error::new(ErrorKind::ContextClosed)
                .with_message(format!("context {} is closed", self.shared.id)));
        }
        self.shared.queue.push(job);
        self.shared.wake();
        Ok(())
    }
}

impl Scheduler for SingleThreadContext {
    fn schedule(&self, delay: Duration, job: Job) -> Scheduled {
        if self.shared.is_closed() {
            return Scheduled::rejected();
        }
        let (task, handle) = ScheduledTask::once(job);
        let deadline = self.shared.clock.now() + delay;
        self.shared.insert_timer(deadline, task);
        handle
    }

    fn schedule_at_fixed_rate(
        &self,
        initial_delay: Duration,
        period: Duration,
        work: Box<dyn FnMut() + Send>,
    ) -> Scheduled {
        if self.shared.is_closed() {
            return Scheduled::rejected();
        }
        let (task, handle) = ScheduledTask::periodic(period, work);
        let deadline = self.shared.clock.now() + initial_delay;
        self.shared.insert_timer(deadline, task);
        handle
    }
}

impl ThreadContext for SingleThreadContext {
    fn id(&self) -> ContextId {
        self.shared.id
    }

    fn is_blocked(&self) -> bool {
        self.shared.blocked.load(Ordering::Acquire)
    }

    fn block(&self) {
        self.shared.blocked.store(true, Ordering::Release);
    }

    fn unblock(&self) {
        self.shared.blocked.store(false, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let cancelled = self.shared.timers.lock().cancel_all();
        debug!(context = %self.shared.id, cancelled_timers = cancelled.len(), "closing context");
        drop(cancelled);
        self.shared.wake();

        // The loop exits on its own after the current job when closed from inside.
        if self.is_current_context() {
            return;
        }
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!(context = %self.shared.id, "context thread panicked");
            }
        }
    }
}

impl Drop for SingleThreadContext {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for SingleThreadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleThreadContext")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("closed", &self.shared.is_closed())
            .finish_non_exhaustive()
    }
}
