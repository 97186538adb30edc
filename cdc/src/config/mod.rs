//! Configuration objects for the changefeed control plane.
//!
//! Re-exports the shared configuration types required to construct the owner
//! components.

// Re-exports.
pub use cdc_config::shared::*;
