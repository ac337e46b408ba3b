//! Thread contexts: single-thread executors with scheduling and a blocked flag.
//!
//! A [`ThreadContext`] represents exactly one logical thread of control. Work
//! submitted through [`Executor::execute`] and timers registered through
//! [`Scheduler`] always run on that thread, in submission order, so code
//! running inside a context can mutate thread-confined state without locks.
//!
//! The context bound to the calling thread is found with [`current_context`];
//! [`ThreadContext::check_thread`] turns "am I on the right thread?" into an
//! explicit `IllegalState` failure.
//!
//! # Implementations
//!
//! - [`SingleThreadContext`]: a dedicated OS thread with its own event loop
//! - [`LabContext`]: a manually driven context over virtual time, for tests
//! - [`ThreadContextFactory`]: creates named `SingleThreadContext`s

pub mod factory;
pub mod lab;
pub mod registry;
pub mod single_thread;

pub use factory::ThreadContextFactory;
pub use lab::LabContext;
pub use single_thread::SingleThreadContext;

use crate::error::{Error, Result};
use crate::runtime::{Job, Scheduled};
use crate::types::ContextId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Something that runs submitted jobs.
pub trait Executor: Send + Sync {
    /// Submits a job for asynchronous execution.
    ///
    /// Never blocks. A closed context rejects the job with
    /// [`ErrorKind::ContextClosed`](crate::ErrorKind::ContextClosed) and drops it.
    fn execute(&self, job: Job) -> Result<()>;
}

/// Closure-taking convenience over [`Executor`].
pub trait ExecutorExt: Executor {
    /// Submits a closure for asynchronous execution.
    fn submit<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute(Job::new(work))
    }
}

impl<E: Executor + ?Sized> ExecutorExt for E {}

/// Timer facility relative to a context's clock.
pub trait Scheduler: Send + Sync {
    /// Runs `job` once after `delay`.
    fn schedule(&self, delay: Duration, job: Job) -> Scheduled;

    /// Runs `work` after `initial_delay` and then every `period`.
    ///
    /// Deadlines advance by `period` from the previous deadline, not from the
    /// end of the previous run.
    fn schedule_at_fixed_rate(
        &self,
        initial_delay: Duration,
        period: Duration,
        work: Box<dyn FnMut() + Send>,
    ) -> Scheduled;
}

/// Closure-taking convenience over [`Scheduler`].
pub trait SchedulerExt: Scheduler {
    /// Runs `work` once after `delay`.
    fn schedule_fn<F>(&self, delay: Duration, work: F) -> Scheduled
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(delay, Job::new(work))
    }

    /// Runs `work` after `initial_delay` and then every `period`.
    fn schedule_fn_at_fixed_rate<F>(
        &self,
        initial_delay: Duration,
        period: Duration,
        work: F,
    ) -> Scheduled
    where
        F: FnMut() + Send + 'static,
    {
        self.schedule_at_fixed_rate(initial_delay, period, Box::new(work))
    }
}

impl<S: Scheduler + ?Sized> SchedulerExt for S {}

/// A thread-affine execution context.
pub trait ThreadContext: Executor + Scheduler + fmt::Debug {
    /// Returns this context's identifier.
    fn id(&self) -> ContextId;

    /// Returns whether the context is marked as blocked.
    fn is_blocked(&self) -> bool;

    /// Marks the context as blocked.
    ///
    /// Advisory only: nothing is suspended. Code that would wait
    /// synchronously on this context's thread consults the flag.
    fn block(&self);

    /// Clears the blocked mark.
    fn unblock(&self);

    /// Returns whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;

    /// Closes the context.
    ///
    /// Idempotent. Pending scheduled work is cancelled, queued jobs are
    /// discarded, and the thread binding is released.
    fn close(&self);

    /// Returns whether the calling thread is this context's thread.
    fn is_current_context(&self) -> bool {
        registry::current_id() == Some(self.id())
    }

    /// Fails with `IllegalState` unless called from this context's thread.
    fn check_thread(&self) -> Result<()> {
        if self.is_current_context() {
            Ok(())
        } else {
            Err(Error::illegal_state(format!(
                "not on the thread of context {}",
                self.id()
            )))
        }
    }
}

/// Returns the context bound to the calling thread, or `None`.
#[must_use]
pub fn current_context() -> Option<Arc<dyn ThreadContext>> {
    registry::current()
}

/// Returns the context bound to the calling thread, or `IllegalState`.
pub fn current_context_or_err() -> Result<Arc<dyn ThreadContext>> {
    current_context().ok_or_else(|| Error::illegal_state("not on a context thread"))
}

/// Runs each job inline on the submitting thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectExecutor;

impl Executor for DirectExecutor {
    fn execute(&self, job: Job) -> Result<()> {
        job.run();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn no_current_context_off_context_threads() {
        std::thread::spawn(|| {
            assert!(current_context().is_none());
            let err = current_context_or_err().expect_err("no context bound");
            assert!(err.is_illegal_state());
        })
        .join()
        .expect("thread panicked");
    }

    #[test]
    fn direct_executor_runs_inline() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        DirectExecutor
            .submit(move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            })
            .expect("direct executor accepts");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn check_thread_inside_and_outside_lab() {
        let lab = LabContext::new();
        assert!(lab.check_thread().expect_err("off thread").is_illegal_state());

        let inner = Arc::clone(&lab);
        let observed = Arc::new(parking_lot::Mutex::new(None));
        let observed_clone = Arc::clone(&observed);
        lab.submit(move || {
            *observed_clone.lock() = Some(inner.check_thread().is_ok());
        })
        .expect("lab accepts");
        lab.run_until_idle();
        assert_eq!(*observed.lock(), Some(true));
    }
}
