//! Awaiting a completion from async code.

use crate::error::Result;
use crate::future::OrderedCompletion;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Future returned by [`OrderedCompletion::wait`].
///
/// Registers one completion callback on first poll; later polls only refresh
/// the stored waker.
#[must_use = "futures do nothing unless polled"]
pub struct Wait<T> {
    completion: OrderedCompletion<T>,
    waker: Option<Arc<Mutex<Option<Waker>>>>,
}

impl<T> Wait<T> {
    pub(crate) fn new(completion: OrderedCompletion<T>) -> Self {
        Self {
            completion,
            waker: None,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Future for Wait<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(outcome) = this.completion.try_get() {
            return Poll::Ready(outcome);
        }

        if let Some(slot) = &this.waker {
            *slot.lock() = Some(cx.waker().clone());
        } else {
            let slot = Arc::new(Mutex::new(Some(cx.waker().clone())));
            let registered = Arc::clone(&slot);
            this.completion.when_complete(move |_| {
                if let Some(waker) = registered.lock().take() {
                    waker.wake();
                }
            });
            this.waker = Some(slot);
        }

        // Resolution may have raced with registration.
        match this.completion.try_get() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

impl<T> std::fmt::Debug for Wait<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wait")
            .field("completion", &self.completion)
            .finish_non_exhaustive()
    }
}
