//! Completion cells.
//!
//! [`OrderedCompletion`] is the result type every combinator produces: a
//! single-assignment cell whose callbacks run in the order they were
//! registered. [`Wait`] adapts a cell to `std::future::Future`.

pub mod completion;
pub mod wait;

pub use completion::{OrderedCompletion, Outcome};
pub use wait::Wait;
