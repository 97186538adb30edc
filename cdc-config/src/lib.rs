//! Configuration types for the changefeed control plane.
//!
//! Provides shared, serde-serializable configuration structs used by the
//! owner components, together with validation for the values that must be
//! constrained before a changefeed manager is constructed.

pub mod shared;
