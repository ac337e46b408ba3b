//! Named context creation.

use crate::config::ContextConfig;
use crate::cx::SingleThreadContext;
use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Creates [`SingleThreadContext`]s named `{prefix}-{n}`.
///
/// `n` counts up from 1 per factory.
#[derive(Debug)]
pub struct ThreadContextFactory {
    config: ContextConfig,
    next_index: AtomicUsize,
}

impl ThreadContextFactory {
    /// Creates a factory; the config is normalized first.
    #[must_use]
    pub fn new(mut config: ContextConfig) -> Self {
        config.normalize();
        Self {
            config,
            next_index: AtomicUsize::new(1),
        }
    }

    /// Returns the factory's config.
    #[must_use]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Spawns a new context.
    pub fn create(&self) -> Result<Arc<SingleThreadContext>> {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        SingleThreadContext::new(format!("{}-{index}", self.config.thread_name_prefix))
    }
}

impl Default for ThreadContextFactory {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}
