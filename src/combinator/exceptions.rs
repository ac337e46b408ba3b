//! Failure mapping.

use crate::error::Error;
use crate::future::OrderedCompletion;

/// Derives a completion whose failure is rewritten by `mapper`.
///
/// Values pass through untouched and `mapper` is not called.
///
/// # Example
///
/// ```
/// use threadcx::{Error, ErrorKind, OrderedCompletion};
/// use threadcx::combinator::transform_exceptions;
///
/// let source = OrderedCompletion::<u32>::failed(Error::timeout("slow peer"));
/// let mapped = transform_exceptions(&source, |e| Error::upstream(e).with_message("fetch failed"));
/// let err = mapped.try_get().unwrap().unwrap_err();
/// assert_eq!(err.kind(), ErrorKind::Upstream);
/// ```
pub fn transform_exceptions<T, F>(completion: &OrderedCompletion<T>, mapper: F) -> OrderedCompletion<T>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce(Error) -> Error + Send + 'static,
{
    let derived = OrderedCompletion::new();
    let target = derived.clone();
    completion.when_complete(move |outcome| match outcome {
        Ok(value) => {
            target.complete(value.clone());
        }
        Err(err) => {
            target.complete_exceptionally(mapper(err.clone()));
        }
    });
    derived
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn success_passes_through_without_calling_mapper() {
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = Arc::clone(&called);
        let source = OrderedCompletion::new();
        let mapped = transform_exceptions(&source, move |e| {
            called_clone.store(true, Ordering::SeqCst);
            e
        });
        source.complete(9);
        assert_eq!(mapped.try_get().expect("done").expect("ok"), 9);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn failure_is_rewritten_and_keeps_cause() {
        let source = OrderedCompletion::<i32>::new();
        let mapped = transform_exceptions(&source, |e| {
            Error::upstream(e).with_message("wrapped")
        });
        source.complete_exceptionally(Error::timeout("inner"));

        let err = mapped.try_get().expect("done").expect_err("failed");
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.message(), Some("wrapped"));
        let cause = err.source_as::<Error>().expect("cause kept");
        assert!(cause.is_timeout());
    }
}
