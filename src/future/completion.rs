//! Single-assignment completion cell with ordered callbacks.
//!
//! # State Machine
//!
//! ```text
//!             complete / complete_exceptionally (CAS winner)
//!   PENDING ──────────────────────────────────────────────► RESOLVING ──► DONE
//!      │                                                                   │
//!      └── when_complete: callback queued                                  │
//!                          when_complete: callback queued, drained ◄───────┘
//! ```
//!
//! The PENDING → RESOLVING transition is a compare-and-set, so exactly one
//! resolver wins; every other resolver gets `false` and changes nothing.
//!
//! # Callback Ordering
//!
//! Callbacks are kept in one FIFO queue and invoked by a single drainer at a
//! time. Whoever finds the cell terminal with nobody draining claims the
//! drainer role and pops callbacks one by one, invoking each outside the lock.
//! A callback registered while a drain is in progress, including from inside
//! a running callback, is appended and invoked after everything queued before
//! it. Callbacks therefore run strictly in registration order, even when the
//! resolving thread races with registering threads.

use crate::error::{Error, Result};
use crate::future::wait::Wait;
use crate::runtime::stored_task::panic_message;
use crate::tracing_compat::error;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

const PENDING: u8 = 0;
const RESOLVING: u8 = 1;
const DONE: u8 = 2;

/// Borrowed view of a terminal outcome, passed to callbacks.
pub type Outcome<'a, T> = std::result::Result<&'a T, &'a Error>;

type Callback<T> = Box<dyn FnOnce(Outcome<'_, T>) + Send>;

struct CallbackQueue<T> {
    callbacks: VecDeque<Callback<T>>,
    terminal: bool,
    draining: bool,
}

struct Inner<T> {
    state: AtomicU8,
    outcome: OnceLock<std::result::Result<T, Error>>,
    queue: Mutex<CallbackQueue<T>>,
    // Signalled under `queue` when `terminal` is set; shared by all blocking waiters.
    resolved: Condvar,
}

/// A single-assignment result cell whose callbacks run in registration order.
///
/// Handles are cheap to clone; every clone refers to the same cell.
///
/// # Example
///
/// ```
/// use threadcx::OrderedCompletion;
/// use std::sync::{Arc, Mutex};
///
/// let cell = OrderedCompletion::<i32>::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// for tag in ["a", "b"] {
///     let seen = Arc::clone(&seen);
///     cell.when_complete(move |r| seen.lock().unwrap().push((tag, *r.unwrap())));
/// }
/// assert!(cell.complete(7));
/// assert!(!cell.complete(8));
/// assert_eq!(*seen.lock().unwrap(), vec![("a", 7), ("b", 7)]);
/// ```
pub struct OrderedCompletion<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for OrderedCompletion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> Default for OrderedCompletion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> OrderedCompletion<T> {
    /// Creates a pending completion.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(PENDING),
                outcome: OnceLock::new(),
                queue: Mutex::new(CallbackQueue {
                    callbacks: VecDeque::new(),
                    terminal: false,
                    draining: false,
                }),
                resolved: Condvar::new(),
            }),
        }
    }

    /// Creates a completion already resolved with `value`.
    #[must_use]
    pub fn completed(value: T) -> Self {
        let cell = Self::new();
        cell.complete(value);
        cell
    }

    /// Creates a completion already failed with `error`.
    #[must_use]
    pub fn failed(error: Error) -> Self {
        let cell = Self::new();
        cell.complete_exceptionally(error);
        cell
    }

    /// Resolves the cell with a value.
    ///
    /// Returns `true` if this call won; a later call changes nothing.
    pub fn complete(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    /// Resolves the cell with a failure.
    ///
    /// Returns `true` if this call won; a later call changes nothing.
    pub fn complete_exceptionally(&self, error: Error) -> bool {
        self.resolve(Err(error))
    }

    /// Resolves the cell with either outcome.
    pub fn resolve(&self, outcome: std::result::Result<T, Error>) -> bool {
        if self
            .inner
            .state
            .compare_exchange(PENDING, RESOLVING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let _ = self.inner.outcome.set(outcome);

        let claimed = {
            let mut queue = self.inner.queue.lock();
            queue.terminal = true;
            self.inner.state.store(DONE, Ordering::Release);
            self.inner.resolved.notify_all();
            claim_drain(&mut queue)
        };
        if claimed {
            self.drain();
        }
        true
    }

    /// Registers a callback for the terminal outcome.
    ///
    /// Runs after every callback registered before it. If the cell is already
    /// terminal and nothing is draining, runs on the calling thread before
    /// this method returns.
    pub fn when_complete<F>(&self, callback: F)
    where
        F: FnOnce(Outcome<'_, T>) + Send + 'static,
    {
        let claimed = {
            let mut queue = self.inner.queue.lock();
            queue.callbacks.push_back(Box::new(callback));
            queue.terminal && claim_drain(&mut queue)
        };
        if claimed {
            self.drain();
        }
    }

    fn drain(&self) {
        let Some(outcome) = self.inner.outcome.get() else {
            return;
        };
        loop {
            let callback = {
                let mut queue = self.inner.queue.lock();
                match queue.callbacks.pop_front() {
                    Some(callback) => callback,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(outcome.as_ref()))) {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "completion callback panicked");
                let _ = &message;
            }
        }
    }

    /// Blocks the calling thread until the cell is terminal or `deadline` passes.
    ///
    /// Registers no callback, so repeated timed-out waits leave nothing behind.
    /// Returns whether the cell is terminal.
    pub(crate) fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let mut queue = self.inner.queue.lock();
        while !queue.terminal {
            match deadline {
                Some(deadline) => {
                    if self.inner.resolved.wait_until(&mut queue, deadline).timed_out() {
                        break;
                    }
                }
                None => self.inner.resolved.wait(&mut queue),
            }
        }
        queue.terminal
    }

    #[cfg(test)]
    pub(crate) fn queued_callbacks(&self) -> usize {
        self.inner.queue.lock().callbacks.len()
    }

    /// Returns whether the cell is terminal.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == DONE
    }

    /// Returns whether the cell failed.
    #[must_use]
    pub fn is_completed_exceptionally(&self) -> bool {
        self.is_done() && matches!(self.inner.outcome.get(), Some(Err(_)))
    }

    /// Returns the outcome if terminal, without waiting.
    #[must_use]
    pub fn try_get(&self) -> Option<Result<T>>
    where
        T: Clone,
    {
        if !self.is_done() {
            return None;
        }
        self.inner.outcome.get().cloned()
    }

    /// Derives a completion holding `f` applied to the value.
    ///
    /// Failures propagate unchanged. A panic in `f` fails the derived cell
    /// with an internal error.
    pub fn map<U, F>(&self, f: F) -> OrderedCompletion<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        let derived = OrderedCompletion::new();
        let target = derived.clone();
        self.when_complete(move |outcome| match outcome {
            Ok(value) => {
                target.resolve(guarded(|| f(value)));
            }
            Err(err) => {
                target.complete_exceptionally(err.clone());
            }
        });
        derived
    }

    /// Derives a completion that follows the completion returned by `f`.
    pub fn and_then<U, F>(&self, f: F) -> OrderedCompletion<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(&T) -> OrderedCompletion<U> + Send + 'static,
    {
        let derived = OrderedCompletion::new();
        let target = derived.clone();
        self.when_complete(move |outcome| match outcome {
            Ok(value) => match guarded(|| f(value)) {
                Ok(next) => next.forward_to(target),
                Err(err) => {
                    target.complete_exceptionally(err);
                }
            },
            Err(err) => {
                target.complete_exceptionally(err.clone());
            }
        });
        derived
    }

    /// Derives a completion from either outcome.
    pub fn handle<U, F>(&self, f: F) -> OrderedCompletion<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(Outcome<'_, T>) -> U + Send + 'static,
    {
        let derived = OrderedCompletion::new();
        let target = derived.clone();
        self.when_complete(move |outcome| {
            target.resolve(guarded(|| f(outcome)));
        });
        derived
    }

    /// Returns a fresh ordered cell that mirrors this one.
    #[must_use]
    pub fn ordered(&self) -> Self
    where
        T: Clone,
    {
        let derived = Self::new();
        self.forward_to(derived.clone());
        derived
    }

    /// Resolves `target` with this cell's outcome once terminal.
    pub(crate) fn forward_to(&self, target: Self)
    where
        T: Clone,
    {
        self.when_complete(move |outcome| {
            target.resolve(outcome.cloned().map_err(Clone::clone));
        });
    }

    /// Returns a future resolving to this cell's outcome.
    #[must_use]
    pub fn wait(&self) -> Wait<T>
    where
        T: Clone,
    {
        Wait::new(self.clone())
    }
}

fn claim_drain<T>(queue: &mut CallbackQueue<T>) -> bool {
    if queue.draining {
        false
    } else {
        queue.draining = true;
        true
    }
}

fn guarded<R>(f: impl FnOnce() -> R) -> Result<R> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        Error::internal(format!(
            "derivation panicked: {}",
            panic_message(payload.as_ref())
        ))
    })
}

impl<T> fmt::Debug for OrderedCompletion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.state.load(Ordering::Acquire) {
            PENDING => "pending",
            RESOLVING => "resolving",
            _ => match self.inner.outcome.get() {
                Some(Ok(_)) => "completed",
                _ => "failed",
            },
        };
        f.debug_struct("OrderedCompletion")
            .field("state", &state)
            .finish_non_exhaustive()
    }
}
