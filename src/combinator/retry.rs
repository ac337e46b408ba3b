//! Retry loop over an asynchronous predicate.
//!
//! The loop calls a supplier that returns a completion of `bool`:
//!
//! ```text
//!   attempt ──► predicate resolves
//!                 ├── Ok(true)  ──► loop completes successfully
//!                 ├── Ok(false) ──► next attempt scheduled after `delay` ──► attempt
//!                 └── Err(e)    ──► loop fails with e
//! ```
//!
//! There is no attempt bound. Each later attempt is a fresh job scheduled on
//! the loop's context, so the stack never grows with the number of attempts
//! and the supplier always runs on the context thread after the first call.
//! The first attempt runs on the thread that starts the loop.
//!
//! # Cancellation
//!
//! [`RetryHandle::cancel`] stops future attempts and fails the loop with
//! `Cancelled`. An attempt already in flight is not interrupted; its outcome
//! is ignored.
//!
//! If the context closes while an attempt is waiting for its delay, the
//! dropped job fails the loop with `ContextClosed`.

use crate::config::{ContextConfig, DEFAULT_RETRY_DELAY};
use crate::cx::ThreadContext;
use crate::error::{Error, ErrorKind};
use crate::future::OrderedCompletion;
use crate::runtime::stored_task::panic_message;
use crate::runtime::{Job, Scheduled};
use crate::tracing_compat::{debug, trace};
use parking_lot::Mutex;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Retries `supplier` on `context` until it yields `true` or fails.
///
/// Uses the default delay of 10 milliseconds between attempts.
///
/// # Example
///
/// ```
/// use threadcx::combinator::retry;
/// use threadcx::cx::LabContext;
/// use threadcx::OrderedCompletion;
/// use std::time::Duration;
///
/// let lab = LabContext::new();
/// let mut calls = 0;
/// let done = retry(
///     move || {
///         calls += 1;
///         OrderedCompletion::completed(calls == 3)
///     },
///     lab.clone(),
/// );
/// lab.advance(Duration::from_millis(20));
/// assert!(done.try_get().unwrap().is_ok());
/// ```
pub fn retry<F, C>(supplier: F, context: Arc<C>) -> OrderedCompletion<()>
where
    F: FnMut() -> OrderedCompletion<bool> + Send + 'static,
    C: ThreadContext + ?Sized + 'static,
{
    Retry::new(supplier, context).start().into_completion()
}

/// Builder for a retry loop.
pub struct Retry<F, C: ?Sized> {
    supplier: F,
    context: Arc<C>,
    delay: Duration,
}

impl<F, C> Retry<F, C>
where
    F: FnMut() -> OrderedCompletion<bool> + Send + 'static,
    C: ThreadContext + ?Sized + 'static,
{
    /// Creates a retry loop with the default delay.
    pub fn new(supplier: F, context: Arc<C>) -> Self {
        Self {
            supplier,
            context,
            delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Sets the delay between attempts.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Takes the delay from `config`.
    #[must_use]
    pub fn with_config(self, config: &ContextConfig) -> Self {
        self.delay(config.retry_delay)
    }

    /// Starts the loop, running the first attempt on the calling thread.
    pub fn start(self) -> RetryHandle {
        let shared = Arc::new(RetryShared::default());
        let completion = OrderedCompletion::new();
        let retry_loop = Arc::new(RetryLoop {
            supplier: Mutex::new(self.supplier),
            context: self.context,
            delay: self.delay,
            completion: completion.clone(),
            shared: Arc::clone(&shared),
        });
        debug!(context = %retry_loop.context.id(), delay = ?self.delay, "retry loop started");
        retry_loop.attempt();
        RetryHandle { completion, shared }
    }
}

impl<F, C: ?Sized + fmt::Debug> fmt::Debug for Retry<F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("context", &self.context)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RetryShared {
    attempts: AtomicU64,
    cancelled: AtomicBool,
    pending: Mutex<Option<Scheduled>>,
}

struct RetryLoop<F, C: ?Sized> {
    supplier: Mutex<F>,
    context: Arc<C>,
    delay: Duration,
    completion: OrderedCompletion<()>,
    shared: Arc<RetryShared>,
}

impl<F, C> RetryLoop<F, C>
where
    F: FnMut() -> OrderedCompletion<bool> + Send + 'static,
    C: ThreadContext + ?Sized + 'static,
{
    fn is_stopped(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire) || self.completion.is_done()
    }

    fn attempt(self: Arc<Self>) {
        if self.is_stopped() {
            return;
        }
        let attempt = self.shared.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(attempt, "retry attempt");
        let _ = attempt;

        let predicate = {
            let mut supplier = self.supplier.lock();
            catch_unwind(AssertUnwindSafe(|| (*supplier)()))
        };
        let predicate = match predicate {
            Ok(predicate) => predicate,
            Err(payload) => {
                self.completion.complete_exceptionally(Error::internal(format!(
                    "retry supplier panicked: {}",
                    panic_message(payload.as_ref())
                )));
                return;
            }
        };

        predicate.when_complete(move |outcome| match outcome {
            Ok(&true) => {
                debug!(attempts = attempt, "retry loop succeeded");
                self.completion.complete(());
            }
            Ok(&false) => self.schedule_next(),
            Err(err) => {
                debug!(attempts = attempt, error = %err, "retry loop failed");
                self.completion.complete_exceptionally(err.clone());
            }
        });
    }

    fn schedule_next(self: Arc<Self>) {
        if self.is_stopped() {
            return;
        }
        let next = PendingAttempt {
            retry_loop: Some(Arc::clone(&self)),
        };
        // A closed context drops the job, which fails the loop.
        let handle = self.context.schedule(self.delay, Job::new(move || next.run()));
        *self.shared.pending.lock() = Some(handle);
    }
}

/// The next attempt, waiting in the context's timer heap.
///
/// Dropped without running means the context discarded it.
struct PendingAttempt<F, C: ?Sized> {
    retry_loop: Option<Arc<RetryLoop<F, C>>>,
}

impl<F, C> PendingAttempt<F, C>
where
    F: FnMut() -> OrderedCompletion<bool> + Send + 'static,
    C: ThreadContext + ?Sized + 'static,
{
    fn run(mut self) {
        if let Some(retry_loop) = self.retry_loop.take() {
            retry_loop.attempt();
        }
    }
}

impl<F, C: ?Sized> Drop for PendingAttempt<F, C> {
    fn drop(&mut self) {
        let Some(retry_loop) = self.retry_loop.take() else {
            return;
        };
        // A cancelled loop is failed by `RetryHandle::cancel`.
        if retry_loop.shared.cancelled.load(Ordering::Acquire) {
            return;
        }
        debug!("retry attempt discarded by its context");
        retry_loop.completion.complete_exceptionally(
            Error::new(ErrorKind::ContextClosed)
                .with_message("retry context closed before the next attempt"),
        );
    }
}

/// Handle to a running retry loop.
#[derive(Clone)]
pub struct RetryHandle {
    completion: OrderedCompletion<()>,
    shared: Arc<RetryShared>,
}

impl RetryHandle {
    /// Returns the loop's completion.
    #[must_use]
    pub fn completion(&self) -> &OrderedCompletion<()> {
        &self.completion
    }

    /// Consumes the handle, returning the loop's completion.
    #[must_use]
    pub fn into_completion(self) -> OrderedCompletion<()> {
        self.completion
    }

    /// Returns how many times the supplier has been called.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::Acquire)
    }

    /// Stops the loop and fails its completion with `Cancelled`.
    ///
    /// Returns `false` if the loop had already finished.
    pub fn cancel(&self) -> bool {
        self.shared.cancelled.store(true, Ordering::Release);
        if let Some(pending) = self.shared.pending.lock().take() {
            pending.cancel();
        }
        self.completion
            .complete_exceptionally(Error::cancelled("retry loop cancelled"))
    }
}

impl fmt::Debug for RetryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryHandle")
            .field("attempts", &self.attempts())
            .field("completion", &self.completion)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cx::LabContext;
    use crate::time::TimeSource;
    use crate::types::Time;

    /// Supplier answering from `script`, recording the virtual time of each call.
    fn scripted(
        lab: &Arc<LabContext>,
        script: Vec<Result<bool, Error>>,
    ) -> (
        impl FnMut() -> OrderedCompletion<bool> + Send + 'static,
        Arc<Mutex<Vec<Time>>>,
    ) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);
        let clock = Arc::clone(lab.clock());
        let mut script = script.into_iter();
        let supplier = move || {
            recorded.lock().push(clock.now());
            match script.next() {
                Some(outcome) => {
                    let cell = OrderedCompletion::new();
                    cell.resolve(outcome);
                    cell
                }
                None => OrderedCompletion::completed(false),
            }
        };
        (supplier, calls)
    }

    #[test]
    fn succeeds_on_third_attempt_with_fixed_spacing() {
        let lab = LabContext::new();
        let (supplier, calls) = scripted(&lab, vec![Ok(false), Ok(false), Ok(true)]);
        let done = retry(supplier, Arc::clone(&lab));

        lab.advance(Duration::from_millis(100));
        assert!(done.try_get().expect("done").is_ok());
        assert_eq!(
            *calls.lock(),
            vec![Time::ZERO, Time::from_millis(10), Time::from_millis(20)]
        );
    }

    #[test]
    fn predicate_failure_stops_the_loop() {
        let lab = LabContext::new();
        let (supplier, calls) = scripted(
            &lab,
            vec![Ok(false), Err(Error::internal("predicate broke"))],
        );
        let done = retry(supplier, Arc::clone(&lab));

        lab.advance(Duration::from_millis(100));
        let err = done.try_get().expect("done").expect_err("failed");
        assert_eq!(err.message(), Some("predicate broke"));
        assert_eq!(calls.lock().len(), 2);
    }

    #[test]
    fn custom_delay() {
        let lab = LabContext::new();
        let (supplier, calls) = scripted(&lab, vec![Ok(false), Ok(true)]);
        let handle = Retry::new(supplier, Arc::clone(&lab))
            .delay(Duration::from_millis(3))
            .start();
        lab.advance(Duration::from_millis(10));
        assert!(handle.completion().is_done());
        assert_eq!(handle.attempts(), 2);
        assert_eq!(*calls.lock(), vec![Time::ZERO, Time::from_millis(3)]);
    }

    #[test]
    fn config_supplies_delay() {
        let lab = LabContext::new();
        let (supplier, calls) = scripted(&lab, vec![Ok(false), Ok(true)]);
        let config = ContextConfig::new().retry_delay(Duration::from_millis(7));
        let handle = Retry::new(supplier, Arc::clone(&lab))
            .with_config(&config)
            .start();
        lab.advance(Duration::from_millis(10));
        assert!(handle.completion().is_done());
        assert_eq!(calls.lock()[1], Time::from_millis(7));
    }

    #[test]
    fn cancel_stops_future_attempts() {
        let lab = LabContext::new();
        let (supplier, calls) = scripted(&lab, Vec::new());
        let handle = Retry::new(supplier, Arc::clone(&lab)).start();

        lab.advance(Duration::from_millis(25));
        assert_eq!(handle.attempts(), 3);
        assert!(handle.cancel());
        assert!(!handle.cancel());

        lab.advance(Duration::from_millis(100));
        assert_eq!(calls.lock().len(), 3);
        let err = handle.completion().try_get().expect("done").expect_err("cancelled");
        assert!(err.is_cancelled());
    }

    #[test]
    fn closed_context_fails_the_loop() {
        let lab = LabContext::new();
        lab.close();
        let (supplier, calls) = scripted(&lab, vec![Ok(false)]);
        let done = retry(supplier, Arc::clone(&lab));
        let err = done.try_get().expect("done").expect_err("closed");
        assert_eq!(err.kind(), ErrorKind::ContextClosed);
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn closing_the_context_mid_loop_fails_the_loop() {
        let lab = LabContext::new();
        let (supplier, calls) = scripted(&lab, Vec::new());
        let handle = Retry::new(supplier, Arc::clone(&lab)).start();

        lab.advance(Duration::from_millis(5));
        assert_eq!(handle.attempts(), 1);
        assert!(!handle.completion().is_done());

        lab.close();
        lab.advance(Duration::from_millis(100));
        let err = handle
            .completion()
            .try_get()
            .expect("done")
            .expect_err("closed");
        assert_eq!(err.kind(), ErrorKind::ContextClosed);
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn cancel_is_not_overridden_by_the_discarded_attempt() {
        let lab = LabContext::new();
        let (supplier, _calls) = scripted(&lab, Vec::new());
        let handle = Retry::new(supplier, Arc::clone(&lab)).start();

        assert!(handle.cancel());
        lab.close();
        let err = handle.completion().try_get().expect("done").expect_err("cancelled");
        assert!(err.is_cancelled());
    }

    #[test]
    fn supplier_panic_fails_the_loop() {
        let lab = LabContext::new();
        let done = retry(|| -> OrderedCompletion<bool> { panic!("supplier") }, Arc::clone(&lab));
        let err = done.try_get().expect("done").expect_err("failed");
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn pending_predicate_resolved_later() {
        let lab = LabContext::new();
        let predicate = OrderedCompletion::new();
        let handed_out = predicate.clone();
        let mut first = true;
        let done = retry(
            move || {
                if first {
                    first = false;
                    handed_out.clone()
                } else {
                    OrderedCompletion::completed(true)
                }
            },
            Arc::clone(&lab),
        );
        lab.advance(Duration::from_millis(50));
        assert!(!done.is_done());

        predicate.complete(false);
        lab.advance(Duration::from_millis(10));
        assert!(done.try_get().expect("done").is_ok());
    }
}
