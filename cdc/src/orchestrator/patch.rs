use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::CdcResult;
use crate::model::{CaptureId, ChangefeedId};

/// Typed key of one distributed record.
///
/// Each variant maps to a single key in the coordination store; the record
/// behind it is the unit of optimistic compare-and-swap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    /// The changefeed descriptor ([`crate::model::ChangefeedInfo`]).
    Info { changefeed_id: ChangefeedId },
    /// The changefeed runtime status ([`crate::model::ChangefeedStatus`]).
    Status { changefeed_id: ChangefeedId },
    /// One capture's table assignments for the changefeed.
    TaskStatus {
        changefeed_id: ChangefeedId,
        capture_id: CaptureId,
    },
    /// One capture's progress checkpoint and error mailbox.
    TaskPosition {
        changefeed_id: ChangefeedId,
        capture_id: CaptureId,
    },
    /// One capture's load metrics for the changefeed.
    TaskWorkload {
        changefeed_id: ChangefeedId,
        capture_id: CaptureId,
    },
}

impl RecordKey {
    /// Returns the changefeed this record belongs to.
    pub fn changefeed_id(&self) -> &ChangefeedId {
        match self {
            Self::Info { changefeed_id }
            | Self::Status { changefeed_id }
            | Self::TaskStatus { changefeed_id, .. }
            | Self::TaskPosition { changefeed_id, .. }
            | Self::TaskWorkload { changefeed_id, .. } => changefeed_id,
        }
    }

    /// Returns the capture this record belongs to, if it is capture scoped.
    pub fn capture_id(&self) -> Option<&CaptureId> {
        match self {
            Self::Info { .. } | Self::Status { .. } => None,
            Self::TaskStatus { capture_id, .. }
            | Self::TaskPosition { capture_id, .. }
            | Self::TaskWorkload { capture_id, .. } => Some(capture_id),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info { changefeed_id } => write!(f, "/changefeed/info/{changefeed_id}"),
            Self::Status { changefeed_id } => write!(f, "/changefeed/status/{changefeed_id}"),
            Self::TaskStatus {
                changefeed_id,
                capture_id,
            } => write!(f, "/task/status/{capture_id}/{changefeed_id}"),
            Self::TaskPosition {
                changefeed_id,
                capture_id,
            } => write!(f, "/task/position/{capture_id}/{changefeed_id}"),
            Self::TaskWorkload {
                changefeed_id,
                capture_id,
            } => write!(f, "/task/workload/{capture_id}/{changefeed_id}"),
        }
    }
}

/// A queued mutation over one record's serialized value.
///
/// The function must be pure and side-effect-free so the store can replay it
/// against a fresher base value after a compare-and-swap conflict. `None`
/// input means the record is absent (first creation, or observed deletion);
/// `None` output deletes the record. Returning `changed = false` must be a
/// true no-op so the store can skip the write.
pub type PatchFn = Arc<dyn Fn(Option<&[u8]>) -> CdcResult<(Option<Vec<u8>>, bool)> + Send + Sync>;

/// An atomic mutation proposed against one distributed record.
#[derive(Clone)]
pub struct DataPatch {
    pub key: RecordKey,
    pub fun: PatchFn,
}

impl DataPatch {
    pub fn new(key: RecordKey, fun: PatchFn) -> Self {
        Self { key, fun }
    }

    /// Applies the patch function to a base value.
    pub fn apply(&self, base: Option<&[u8]>) -> CdcResult<(Option<Vec<u8>>, bool)> {
        (self.fun)(base)
    }
}

impl fmt::Debug for DataPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPatch").field("key", &self.key).finish()
    }
}

/// A batch of queued patches together with the revision at which the
/// proposing actor last observed each touched record.
///
/// The store compares these revisions against its own to detect conflicting
/// concurrent writers. A record the actor has never observed carries revision
/// zero, which matches an absent record on the store side.
#[derive(Debug, Default)]
pub struct PatchBatch {
    pub patches: Vec<DataPatch>,
    pub base_revisions: HashMap<RecordKey, i64>,
}

impl PatchBatch {
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Returns the revision at which the proposer last observed `key`.
    pub fn base_revision(&self, key: &RecordKey) -> i64 {
        self.base_revisions.get(key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keys_render_store_paths() {
        let key = RecordKey::Info {
            changefeed_id: "feed-1".into(),
        };
        assert_eq!(key.to_string(), "/changefeed/info/feed-1");

        let key = RecordKey::TaskPosition {
            changefeed_id: "feed-1".into(),
            capture_id: "capture-a".into(),
        };
        assert_eq!(key.to_string(), "/task/position/capture-a/feed-1");
        assert_eq!(key.capture_id().unwrap().as_str(), "capture-a");
        assert_eq!(key.changefeed_id().as_str(), "feed-1");
    }

    #[test]
    fn patches_replay_against_any_base() {
        let patch = DataPatch::new(
            RecordKey::Status {
                changefeed_id: "feed-1".into(),
            },
            Arc::new(|base| {
                let mut value = base.map(<[u8]>::to_vec).unwrap_or_default();
                value.push(b'x');
                Ok((Some(value), true))
            }),
        );

        let (first, changed) = patch.apply(None).unwrap();
        assert!(changed);
        assert_eq!(first.as_deref(), Some(b"x".as_slice()));

        // Same patch, different base: pure functions make CAS retries safe.
        let (second, _) = patch.apply(Some(b"ab".as_slice())).unwrap();
        assert_eq!(second.as_deref(), Some(b"abx".as_slice()));
    }
}
