pub mod config;
pub mod error;
mod macros;
pub mod model;
pub mod orchestrator;
pub mod owner;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
