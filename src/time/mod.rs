//! Clocks used by context schedulers.

pub mod driver;

pub use driver::{TimeSource, VirtualClock, WallClock};
