//! Joining many completions into one.
//!
//! `all_of` resolves once every input has a value, with the values in input
//! order regardless of the order in which the inputs resolved. The first
//! observed failure fails the join immediately; siblings are neither cancelled
//! nor awaited.

use crate::future::OrderedCompletion;
use parking_lot::Mutex;
use std::sync::Arc;

struct JoinState<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
}

/// Joins `completions` into a completion of all their values, in input order.
///
/// Empty input completes immediately with an empty vector.
pub fn all_of<T, I>(completions: I) -> OrderedCompletion<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = OrderedCompletion<T>>,
{
    let inputs: Vec<_> = completions.into_iter().collect();
    let joined = OrderedCompletion::new();
    if inputs.is_empty() {
        joined.complete(Vec::new());
        return joined;
    }

    let state = Arc::new(Mutex::new(JoinState {
        slots: vec![None; inputs.len()],
        remaining: inputs.len(),
    }));

    for (index, input) in inputs.into_iter().enumerate() {
        let state = Arc::clone(&state);
        let joined = joined.clone();
        input.when_complete(move |outcome| match outcome {
            Ok(value) => {
                let values = {
                    let mut state = state.lock();
                    if state.slots[index].is_some() {
                        return;
                    }
                    state.slots[index] = Some(value.clone());
                    state.remaining -= 1;
                    if state.remaining > 0 {
                        return;
                    }
                    std::mem::take(&mut state.slots)
                };
                joined.complete(values.into_iter().flatten().collect());
            }
            Err(err) => {
                joined.complete_exceptionally(err.clone());
            }
        });
    }
    joined
}

/// Joins `completions` and folds their values left to right with `reducer`.
///
/// The fold starts from the first value; `identity` is only the result for
/// empty input.
pub fn all_of_reduce<T, I, R>(completions: I, reducer: R, identity: T) -> OrderedCompletion<T>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = OrderedCompletion<T>>,
    R: Fn(T, T) -> T + Send + 'static,
{
    all_of(completions).map(move |values| {
        values
            .iter()
            .cloned()
            .reduce(|acc, next| reducer(acc, next))
            .unwrap_or(identity)
    })
}
