//! Moving resolution onto an executor.
//!
//! A bridged completion is resolved by a job submitted to the target
//! executor, so its callbacks run on that executor's thread rather than on
//! whichever thread resolved the source.

use crate::cx::{Executor, ExecutorExt};
use crate::error::Error;
use crate::future::OrderedCompletion;
use std::sync::Arc;

/// Derives a completion resolved on `executor` with the source's outcome.
///
/// If the executor rejects the job (for example because its context is
/// closed), the derived completion fails with the rejection error.
pub fn bridge_to_executor<T, E>(
    completion: &OrderedCompletion<T>,
    executor: Arc<E>,
) -> OrderedCompletion<T>
where
    T: Clone + Send + Sync + 'static,
    E: Executor + ?Sized + 'static,
{
    let derived = OrderedCompletion::new();
    let target = derived.clone();
    completion.when_complete(move |outcome| {
        let outcome = outcome.cloned().map_err(Clone::clone);
        resolve_on(executor.as_ref(), target, outcome);
    });
    derived
}

/// A completion resolved with `value` by a job on `executor`.
pub fn completed_async<T, E>(value: T, executor: &E) -> OrderedCompletion<T>
where
    T: Send + Sync + 'static,
    E: Executor + ?Sized,
{
    let completion = OrderedCompletion::new();
    resolve_on(executor, completion.clone(), Ok(value));
    completion
}

/// A completion failed with `error` by a job on `executor`.
pub fn failed_async<T, E>(error: Error, executor: &E) -> OrderedCompletion<T>
where
    T: Send + Sync + 'static,
    E: Executor + ?Sized,
{
    let completion = OrderedCompletion::new();
    resolve_on(executor, completion.clone(), Err(error));
    completion
}

fn resolve_on<T, E>(executor: &E, target: OrderedCompletion<T>, outcome: Result<T, Error>)
where
    T: Send + Sync + 'static,
    E: Executor + ?Sized,
{
    let job_target = target.clone();
    if let Err(rejected) = executor.submit(move || {
        job_target.resolve(outcome);
    }) {
        target.complete_exceptionally(rejected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cx::{LabContext, ThreadContext};
    use crate::error::ErrorKind;
    use parking_lot::Mutex;

    #[test]
    fn resolution_waits_for_the_executor() {
        let lab = LabContext::new();
        let source = OrderedCompletion::new();
        let bridged = bridge_to_executor(&source, Arc::clone(&lab));

        let ran_on_lab = Arc::new(Mutex::new(None));
        let ran_clone = Arc::clone(&ran_on_lab);
        let lab_clone = Arc::clone(&lab);
        bridged.when_complete(move |_| {
            *ran_clone.lock() = Some(lab_clone.is_current_context());
        });

        source.complete(1);
        assert!(!bridged.is_done());
        lab.run_until_idle();
        assert_eq!(bridged.try_get().expect("done").expect("ok"), 1);
        assert_eq!(*ran_on_lab.lock(), Some(true));
    }

    #[test]
    fn failure_is_bridged() {
        let lab = LabContext::new();
        let source = OrderedCompletion::<i32>::new();
        let bridged = bridge_to_executor(&source, Arc::clone(&lab));
        source.complete_exceptionally(Error::timeout("slow"));
        lab.run_until_idle();
        assert!(bridged.try_get().expect("done").expect_err("failed").is_timeout());
    }

    #[test]
    fn closed_executor_fails_the_bridge() {
        let lab = LabContext::new();
        lab.close();
        let source = OrderedCompletion::completed(1);
        let bridged = bridge_to_executor(&source, Arc::clone(&lab));
        let err = bridged.try_get().expect("done").expect_err("rejected");
        assert_eq!(err.kind(), ErrorKind::ContextClosed);
    }

    #[test]
    fn completed_and_failed_async_resolve_on_executor() {
        let lab = LabContext::new();
        let ok = completed_async(5, lab.as_ref());
        let failed = failed_async::<i32, _>(Error::cancelled("no"), lab.as_ref());
        assert!(!ok.is_done() && !failed.is_done());
        lab.run_until_idle();
        assert_eq!(ok.try_get().expect("done").expect("ok"), 5);
        assert!(failed.is_completed_exceptionally());
    }

    #[test]
    fn trait_object_executor() {
        let lab = LabContext::new();
        let executor: Arc<dyn Executor> = lab.clone();
        let bridged = bridge_to_executor(&OrderedCompletion::completed(2), executor);
        lab.run_until_idle();
        assert_eq!(bridged.try_get().expect("done").expect("ok"), 2);
    }
}
