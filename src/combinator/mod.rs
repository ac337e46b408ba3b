//! Combinators over [`OrderedCompletion`](crate::OrderedCompletion).
//!
//! - [`join`]: wait for all inputs (`all_of`, `all_of_reduce`)
//! - [`exceptions`]: rewrite failures (`transform_exceptions`)
//! - [`bridge`]: resolve on a chosen executor (`bridge_to_executor`)
//! - [`blocking`]: synchronous waits with a deadline (`get_blocking`)
//! - [`retry`](mod@retry): unbounded retry of an asynchronous predicate

pub mod blocking;
pub mod bridge;
pub mod exceptions;
pub mod join;
pub mod retry;

pub use blocking::{get, get_blocking, get_or_default, get_with};
pub use bridge::{bridge_to_executor, completed_async, failed_async};
pub use exceptions::transform_exceptions;
pub use join::{all_of, all_of_reduce};
pub use retry::{Retry, RetryHandle, retry};

use crate::future::OrderedCompletion;

/// Re-wraps `completion` as a fresh ordered cell.
#[must_use]
pub fn ordered<T>(completion: &OrderedCompletion<T>) -> OrderedCompletion<T>
where
    T: Clone + Send + Sync + 'static,
{
    completion.ordered()
}
