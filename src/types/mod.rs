//! Core value types.
//!
//! - [`id`]: Identifier and timestamp types (`ContextId`, `Time`)

pub mod id;

pub use id::{ContextId, Time};
