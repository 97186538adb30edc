use std::collections::HashMap;
use std::future::Future;

use crate::error::CdcResult;
use crate::model::ChangefeedId;
use crate::orchestrator::patch::{PatchBatch, RecordKey};

/// A record value together with the store revision of its last write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub value: Vec<u8>,
    /// Monotonic store revision of the write that produced this value.
    /// An absent record has revision zero.
    pub mod_revision: i64,
}

/// Outcome of applying one queued patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The patch changed the record, applied against the proposer's base.
    Applied,
    /// The patch reported `changed = false`; the write was skipped.
    NoOp,
    /// A concurrent writer had moved the record past the proposer's observed
    /// revision; the patch was recomputed against the fresher value and
    /// applied by the store, not by the caller.
    ConflictRetried,
    /// The patch function returned an error; its record was not written.
    Failed,
}

/// Result of applying a [`PatchBatch`].
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Per-patch outcomes, parallel to the submitted batch.
    pub outcomes: Vec<PatchOutcome>,
    /// Post-apply value of every record the batch wrote, `None` for records
    /// it deleted. Feeding these back into the mirror refreshes it for the
    /// next tick.
    pub changed: HashMap<RecordKey, Option<VersionedValue>>,
}

impl ApplyReport {
    /// Returns `true` if no patch in the batch failed.
    ///
    /// A dirty report means the reconciliation cycle that produced the batch
    /// must be retried by the caller; the store never retries a failing
    /// patch function itself.
    pub fn is_clean(&self) -> bool {
        !self
            .outcomes
            .iter()
            .any(|outcome| matches!(outcome, PatchOutcome::Failed))
    }
}

/// The backing coordination service for distributed changefeed records.
///
/// Implementations must apply each record's queued patches as an atomic
/// compare-and-swap against the proposer's last-observed revision: on a
/// conflict the patch chain is recomputed against the fresher value and
/// retried by the store, never by the caller. Per-record application is
/// all-or-nothing, and the post-apply value is surfaced so the proposer's
/// mirror can be refreshed before its next tick.
pub trait StateStore {
    /// Applies a batch of queued patches and reports per-patch outcomes.
    fn apply_patches(
        &self,
        batch: PatchBatch,
    ) -> impl Future<Output = CdcResult<ApplyReport>> + Send;

    /// Returns the current value of one record, if present.
    fn get(
        &self,
        key: &RecordKey,
    ) -> impl Future<Output = CdcResult<Option<VersionedValue>>> + Send;

    /// Returns every record belonging to `changefeed_id`.
    ///
    /// Used to seed or resynchronize a mirror.
    fn snapshot(
        &self,
        changefeed_id: &ChangefeedId,
    ) -> impl Future<Output = CdcResult<HashMap<RecordKey, VersionedValue>>> + Send;
}
