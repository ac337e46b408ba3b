//! Error types and error handling strategy for threadcx.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Errors are cheap to clone, because one failure fans out to every
//!   callback and derived completion that observes it
//! - The original cause of an upstream failure stays reachable through
//!   [`std::error::Error::source`]
//! - Errors are classified by recoverability
//!
//! # Error Categories
//!
//! - **Misuse**: thread-confinement violations, submissions to a closed context
//! - **Timeout**: a blocking wait ran past its deadline
//! - **Cancellation**: a retry loop was cancelled by its owner
//! - **Upstream**: an asynchronous source or predicate failed
//! - **Internal**: invariant violations inside this crate

use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Misuse ===
    /// An operation was invoked from the wrong thread or in the wrong state.
    IllegalState,
    /// Work was submitted to a context that has been closed.
    ContextClosed,

    // === Time ===
    /// A blocking wait exceeded its deadline.
    Timeout,

    // === Cancellation ===
    /// The operation was cancelled before it could finish.
    Cancelled,

    // === Sources ===
    /// An asynchronous source failed; the cause is attached as the source.
    Upstream,

    // === Internal ===
    /// Internal error (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::IllegalState | Self::ContextClosed => ErrorCategory::Misuse,
            Self::Timeout => ErrorCategory::Timeout,
            Self::Cancelled => ErrorCategory::Cancellation,
            Self::Upstream => ErrorCategory::Upstream,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Returns the recoverability classification for this kind.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        match self {
            Self::Timeout => Recoverability::Transient,
            Self::Upstream => Recoverability::Unknown,
            Self::IllegalState | Self::ContextClosed | Self::Cancelled | Self::Internal => {
                Recoverability::Permanent
            }
        }
    }
}

/// Classification of error recoverability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recoverability {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// Permanent failure that will not succeed on retry.
    Permanent,
    /// Depends on the upstream cause.
    Unknown,
}

impl Recoverability {
    /// Returns true if this error is safe to retry.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Programmer misuse; fail fast, never retried.
    Misuse,
    /// Deadline exceeded while waiting.
    Timeout,
    /// Cancelled by the owner of the operation.
    Cancellation,
    /// Failure reported by an asynchronous source.
    Upstream,
    /// Internal errors.
    Internal,
}

/// The main error type for threadcx operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Wraps the failure of an asynchronous source, keeping it as the cause.
    #[must_use]
    pub fn upstream(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorKind::Upstream).with_source(source)
    }

    /// Creates an illegal-state error (thread-confinement or lifecycle misuse).
    #[must_use]
    pub fn illegal_state(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::IllegalState).with_message(detail)
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout).with_message(detail)
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled).with_message(detail)
    }

    /// Creates an internal error (bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Returns true if this error is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Returns true if this error reports an illegal state.
    #[must_use]
    pub const fn is_illegal_state(&self) -> bool {
        matches!(self.kind, ErrorKind::IllegalState)
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the recoverability classification.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        self.kind.recoverability()
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the attached cause, if any, as a concrete type.
    #[must_use]
    pub fn source_as<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.as_deref().and_then(|s| s.downcast_ref::<E>())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        if self.message.is_none() {
            if let Some(source) = &self.source {
                write!(f, ": {source}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Extension trait for adding context to Results.
#[allow(clippy::result_large_err)]
pub trait ResultExt<T> {
    /// Attach a context message on error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_message(msg))
    }
}

/// A specialized Result type for threadcx operations.
#[allow(clippy::result_large_err)]
pub type Result<T> = core::result::Result<T, Error>;
