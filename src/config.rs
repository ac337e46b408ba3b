//! Context configuration.
//!
//! # Configuration Precedence
//!
//! Layers are applied lowest priority first, so later layers win:
//!
//! 1. **Defaults**: [`ContextConfig::default()`]
//! 2. **Config file**: `ContextConfig::apply_toml` (requires `config-file` feature)
//! 3. **Environment variables**: [`ContextConfig::apply_env_overrides`]
//! 4. **Programmatic**: setters such as [`ContextConfig::retry_delay`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `THREADCX_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |
//! | `THREADCX_RETRY_DELAY_MS` | `u64` | `retry_delay` |
//! | `THREADCX_BLOCKING_TIMEOUT_MS` | `u64` | `blocking_timeout` |

use std::time::Duration;
use thiserror::Error;

/// Default name prefix for context threads.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "threadcx";
/// Default delay between retry attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);
/// Default deadline for blocking waits.
pub const DEFAULT_BLOCKING_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable name for the thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "THREADCX_THREAD_NAME_PREFIX";
/// Environment variable name for the retry delay in milliseconds.
pub const ENV_RETRY_DELAY_MS: &str = "THREADCX_RETRY_DELAY_MS";
/// Environment variable name for the blocking-wait timeout in milliseconds.
pub const ENV_BLOCKING_TIMEOUT_MS: &str = "THREADCX_BLOCKING_TIMEOUT_MS";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable or key held a value that does not parse.
    #[error("invalid value for {name}: expected {expected}, got {value:?}")]
    InvalidValue {
        /// Variable or key name.
        name: String,
        /// Human-readable description of the accepted values.
        expected: &'static str,
        /// The rejected raw value.
        value: String,
    },
    /// A TOML document failed to parse.
    #[error("failed to parse TOML config: {0}")]
    Parse(String),
    /// A config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Settings shared by contexts, blocking waits and retry loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Prefix for context thread names.
    pub thread_name_prefix: String,
    /// Delay between retry attempts.
    pub retry_delay: Duration,
    /// Deadline used by `get` when no explicit timeout is given.
    pub blocking_timeout: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            retry_delay: DEFAULT_RETRY_DELAY,
            blocking_timeout: DEFAULT_BLOCKING_TIMEOUT,
        }
    }
}

impl ContextConfig {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Sets the thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Sets the retry delay.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the default blocking timeout.
    #[must_use]
    pub fn blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = timeout;
        self
    }

    /// Replaces unusable values with defaults.
    ///
    /// An empty prefix falls back to the default prefix; a zero blocking
    /// timeout falls back to the default timeout. A zero retry delay is kept
    /// and means "next attempt as soon as the context is free".
    pub fn normalize(&mut self) {
        if self.thread_name_prefix.trim().is_empty() {
            self.thread_name_prefix = DEFAULT_THREAD_NAME_PREFIX.to_string();
        }
        if self.blocking_timeout.is_zero() {
            self.blocking_timeout = DEFAULT_BLOCKING_TIMEOUT;
        }
    }

    /// Applies `THREADCX_*` overrides from the process environment.
    ///
    /// Only variables that are set are applied. Returns an error if a variable
    /// is set but holds an unparseable value.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides read through `lookup` instead of the environment.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(ENV_THREAD_NAME_PREFIX) {
            self.thread_name_prefix = val;
        }
        if let Some(val) = lookup(ENV_RETRY_DELAY_MS) {
            self.retry_delay = parse_millis(ENV_RETRY_DELAY_MS, &val)?;
        }
        if let Some(val) = lookup(ENV_BLOCKING_TIMEOUT_MS) {
            self.blocking_timeout = parse_millis(ENV_BLOCKING_TIMEOUT_MS, &val)?;
        }
        Ok(())
    }
}

fn parse_millis(name: &str, val: &str) -> Result<Duration, ConfigError> {
    val.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            expected: "milliseconds as an unsigned integer",
            value: val.to_string(),
        })
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable context configuration.
///
/// ```toml
/// [context]
/// thread_name_prefix = "myapp-cx"
/// retry_delay_ms = 10
/// blocking_timeout_ms = 30000
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct ContextTomlConfig {
    /// Context settings.
    #[serde(default)]
    pub context: ContextToml,
}

/// Context section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct ContextToml {
    /// Name prefix for context threads.
    pub thread_name_prefix: Option<String>,
    /// Retry delay in milliseconds.
    pub retry_delay_ms: Option<u64>,
    /// Blocking-wait timeout in milliseconds.
    pub blocking_timeout_ms: Option<u64>,
}

#[cfg(feature = "config-file")]
impl ContextConfig {
    /// Applies a parsed TOML config. Only `Some` fields override.
    pub fn apply_toml(&mut self, toml: &ContextTomlConfig) {
        if let Some(ref v) = toml.context.thread_name_prefix {
            self.thread_name_prefix.clone_from(v);
        }
        if let Some(v) = toml.context.retry_delay_ms {
            self.retry_delay = Duration::from_millis(v);
        }
        if let Some(v) = toml.context.blocking_timeout_ms {
            self.blocking_timeout = Duration::from_millis(v);
        }
    }
}

/// Parses a TOML string into a [`ContextTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<ContextTomlConfig, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Reads and parses a TOML file into a [`ContextTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<ContextTomlConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_toml_str(&content)
}
