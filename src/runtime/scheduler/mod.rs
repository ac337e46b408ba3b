//! Queues feeding a context's event loop.

pub mod global_queue;

pub use global_queue::JobQueue;
