//! Synchronous waits on a completion.
//!
//! These are the only operations in the crate that block the calling thread.
//! When the caller is a context thread, the context is marked blocked for the
//! duration of the wait; a second blocking wait on an already-blocked context
//! is refused with `IllegalState` rather than risking a deadlock.

use crate::config::{ContextConfig, DEFAULT_BLOCKING_TIMEOUT};
use crate::cx::{ThreadContext, current_context};
use crate::error::{Error, Result};
use crate::future::OrderedCompletion;
use crate::tracing_compat::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct BlockGuard {
    context: Option<Arc<dyn ThreadContext>>,
}

impl BlockGuard {
    fn enter() -> Result<Self> {
        let Some(context) = current_context() else {
            return Ok(Self { context: None });
        };
        if context.is_blocked() {
            return Err(Error::illegal_state(format!(
                "context {} is already blocked",
                context.id()
            )));
        }
        context.block();
        Ok(Self {
            context: Some(context),
        })
    }
}

impl Drop for BlockGuard {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            context.unblock();
        }
    }
}

/// Waits up to `timeout` for the outcome of `completion`.
///
/// Returns the value, the completion's own failure verbatim, or a `Timeout`
/// error if the deadline passes first.
pub fn get_blocking<T>(completion: &OrderedCompletion<T>, timeout: Duration) -> Result<T>
where
    T: Clone + Send + Sync + 'static,
{
    if let Some(outcome) = completion.try_get() {
        return outcome;
    }
    let _guard = BlockGuard::enter()?;
    completion.wait_until(Instant::now().checked_add(timeout));

    completion.try_get().unwrap_or_else(|| {
        debug!(?timeout, "blocking wait timed out");
        Err(Error::timeout(format!(
            "completion not resolved within {timeout:?}"
        )))
    })
}

/// Waits up to `timeout`, returning `default` on timeout or failure.
///
/// The two cases are indistinguishable to the caller; use
/// [`get_blocking`] to tell them apart.
pub fn get_or_default<T>(completion: &OrderedCompletion<T>, timeout: Duration, default: T) -> T
where
    T: Clone + Send + Sync + 'static,
{
    match get_blocking(completion, timeout) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "blocking wait replaced by default");
            let _ = &err;
            default
        }
    }
}

/// Waits with the default deadline of 30 seconds.
pub fn get<T>(completion: &OrderedCompletion<T>) -> Result<T>
where
    T: Clone + Send + Sync + 'static,
{
    get_blocking(completion, DEFAULT_BLOCKING_TIMEOUT)
}

/// Waits with the deadline configured in `config`.
pub fn get_with<T>(completion: &OrderedCompletion<T>, config: &ContextConfig) -> Result<T>
where
    T: Clone + Send + Sync + 'static,
{
    get_blocking(completion, config.blocking_timeout)
}
