//! Test utilities for threadcx.
//!
//! - Consistent tracing-based logging initialization
//! - Receive-with-deadline helper for cross-thread assertions
//!
//! # Example
//! ```
//! use threadcx::test_utils::init_test_logging;
//!
//! init_test_logging();
//! ```

use std::sync::Once;
use std::sync::mpsc::Receiver;
use std::time::Duration;

static INIT_LOGGING: Once = Once::new();

/// Deadline used by tests waiting on work running on another thread.
pub const TEST_RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Receives one value, panicking if nothing arrives within [`TEST_RECV_TIMEOUT`].
///
/// # Panics
///
/// Panics on timeout or disconnection.
#[allow(clippy::must_use_candidate)]
pub fn recv_or_panic<T>(rx: &Receiver<T>, what: &str) -> T {
    match rx.recv_timeout(TEST_RECV_TIMEOUT) {
        Ok(value) => value,
        Err(err) => panic!("timed out waiting for {what}: {err}"),
    }
}
