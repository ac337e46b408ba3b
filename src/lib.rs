//! threadcx: thread-affine execution contexts and ordered completions.
//!
//! # Overview
//!
//! threadcx is a small asynchronous execution core for code that must run on
//! one specific thread. A context owns exactly one thread of control; work
//! submitted to it runs there in submission order, and timers fire there too.
//! Results flow through [`OrderedCompletion`], a single-assignment cell whose
//! callbacks run in the order they were registered.
//!
//! # Core Guarantees
//!
//! - **Thread affinity**: jobs and timers of a context run on its thread only
//! - **Single assignment**: a completion resolves exactly once; later attempts are no-ops
//! - **Ordered callbacks**: callbacks run in registration order, even across threads
//! - **Explicit blocking**: only the `get*` combinators block, and they mark the context
//! - **Deterministic testing**: [`cx::LabContext`] runs contexts over virtual time
//!
//! # Module Structure
//!
//! - [`cx`]: context traits, the thread binding and context implementations
//! - [`future`]: [`OrderedCompletion`] and its `Future` adapter
//! - [`combinator`]: `all_of`, failure mapping, executor bridging, blocking get, retry
//! - [`runtime`]: jobs, the submission queue and the timer heap
//! - [`time`]: wall-clock and virtual time sources
//! - [`types`]: identifiers and time points
//! - [`config`]: context configuration from code, environment or TOML
//! - [`error`](mod@error): error types
//! - [`tracing_compat`]: optional tracing integration (requires `tracing-integration` feature)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]

pub mod combinator;
pub mod config;
pub mod cx;
pub mod error;
pub mod future;
pub mod runtime;
pub mod time;
pub mod tracing_compat;
pub mod types;

// ── Test-only modules ───────────────────────────────────────────────────

#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

// Re-exports for convenient access to core types
pub use combinator::{
    all_of, all_of_reduce, bridge_to_executor, get_blocking, get_or_default, retry,
    transform_exceptions,
};
pub use config::{ConfigError, ContextConfig};
pub use cx::{
    Executor, ExecutorExt, LabContext, Scheduler, SchedulerExt, SingleThreadContext,
    ThreadContext, ThreadContextFactory, current_context, current_context_or_err,
};
pub use error::{Error, ErrorCategory, ErrorKind, Recoverability, Result, ResultExt};
pub use future::OrderedCompletion;
pub use runtime::{Job, Scheduled};
pub use types::{ContextId, Time};
