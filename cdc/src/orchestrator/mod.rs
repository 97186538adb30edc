//! Optimistic-concurrency state mirroring.
//!
//! Many independent actors (the owner, the scheduler, each capture) propose
//! mutations to shared distributed records without holding locks. A mutation
//! is a [`patch::DataPatch`]: a pure, replayable function over one record,
//! queued on the in-memory [`state::ChangefeedState`] mirror and later applied
//! as a batch by a [`store::StateStore`] with per-record compare-and-swap.

pub mod patch;
pub mod state;
pub mod store;
