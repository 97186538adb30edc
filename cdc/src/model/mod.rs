//! Data model for the changefeed control plane.
//!
//! The records defined here are the unit of optimistic concurrency: each one
//! maps to a single key in the coordination store and is patched atomically
//! through the orchestrator.

mod changefeed;
mod task;

pub use changefeed::*;
pub use task::*;
