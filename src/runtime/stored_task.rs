//! Type-erased work items.
//!
//! `Job` wraps a boxed closure that a context runs exactly once on its own
//! thread. The closure's captures are erased so heterogeneous work can sit in
//! one queue.

use crate::tracing_compat::error;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// A unit of work submitted to a context.
pub struct Job {
    work: Box<dyn FnOnce() + Send>,
}

impl Job {
    /// Creates a new job from a closure.
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            work: Box::new(work),
        }
    }

    /// Runs the job on the calling thread.
    pub fn run(self) {
        (self.work)();
    }

    /// Runs the job, containing any panic so the calling loop survives.
    ///
    /// Returns `false` if the job panicked.
    pub(crate) fn run_contained(self) -> bool {
        match catch_unwind(AssertUnwindSafe(|| self.run())) {
            Ok(()) => true,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "job panicked");
                let _ = &message;
                false
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").finish_non_exhaustive()
    }
}
