//! Owner-side control loops.
//!
//! The owner runs one [`feed_state_manager::FeedStateManager`] per changefeed
//! and ticks each of them from a single-threaded reconciliation loop. The
//! managers never touch the coordination store themselves: they queue patches
//! on the changefeed's state mirror and the owner loop submits the batch.

pub mod feed_state_manager;

pub use feed_state_manager::FeedStateManager;
