//! Execution plumbing shared by every context implementation.
//!
//! - [`stored_task`]: type-erased [`Job`]s
//! - [`scheduler`]: the submission queue feeding a context loop
//! - [`timer`]: the timer heap and the cancellable [`Scheduled`] handle

pub mod scheduler;
pub mod stored_task;
pub mod timer;

pub use scheduler::JobQueue;
pub use stored_task::Job;
pub use timer::Scheduled;
