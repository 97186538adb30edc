use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::bail;
use crate::error::{CdcError, CdcResult, ErrorKind};
use crate::model::{
    CaptureId, ChangefeedId, ChangefeedInfo, ChangefeedStatus, TaskPosition, TaskStatus,
    TaskWorkload,
};
use crate::orchestrator::patch::{DataPatch, PatchBatch, PatchFn, RecordKey};
use crate::orchestrator::store::VersionedValue;

/// In-memory mirror of one changefeed's distributed records.
///
/// The mirror is read-only from the perspective of its users: all mutation
/// goes through the `patch_*` accessors, which queue a pure patch function
/// against the named record instead of mutating in place. The queued batch is
/// handed to a [`crate::orchestrator::store::StateStore`] for atomic
/// application, and the store's post-apply values are reflected back through
/// [`ChangefeedState::update`] before the next reconciliation tick.
#[derive(Debug)]
pub struct ChangefeedState {
    id: ChangefeedId,
    pub info: Option<ChangefeedInfo>,
    pub status: Option<ChangefeedStatus>,
    pub task_statuses: HashMap<CaptureId, TaskStatus>,
    pub task_positions: HashMap<CaptureId, TaskPosition>,
    pub workloads: HashMap<CaptureId, TaskWorkload>,
    observed_revisions: HashMap<RecordKey, i64>,
    pending_patches: Vec<DataPatch>,
}

impl ChangefeedState {
    pub fn new(id: ChangefeedId) -> Self {
        Self {
            id,
            info: None,
            status: None,
            task_statuses: HashMap::new(),
            task_positions: HashMap::new(),
            workloads: HashMap::new(),
            observed_revisions: HashMap::new(),
            pending_patches: Vec::new(),
        }
    }

    pub fn id(&self) -> &ChangefeedId {
        &self.id
    }

    /// Queues a patch against the changefeed descriptor.
    pub fn patch_info<F>(&mut self, f: F)
    where
        F: Fn(Option<ChangefeedInfo>) -> CdcResult<(Option<ChangefeedInfo>, bool)>
            + Send
            + Sync
            + 'static,
    {
        let key = RecordKey::Info {
            changefeed_id: self.id.clone(),
        };
        self.queue_typed(key, f);
    }

    /// Queues a patch against the changefeed status.
    pub fn patch_status<F>(&mut self, f: F)
    where
        F: Fn(Option<ChangefeedStatus>) -> CdcResult<(Option<ChangefeedStatus>, bool)>
            + Send
            + Sync
            + 'static,
    {
        let key = RecordKey::Status {
            changefeed_id: self.id.clone(),
        };
        self.queue_typed(key, f);
    }

    /// Queues a patch against one capture's task status.
    pub fn patch_task_status<F>(&mut self, capture_id: &CaptureId, f: F)
    where
        F: Fn(Option<TaskStatus>) -> CdcResult<(Option<TaskStatus>, bool)> + Send + Sync + 'static,
    {
        let key = RecordKey::TaskStatus {
            changefeed_id: self.id.clone(),
            capture_id: capture_id.clone(),
        };
        self.queue_typed(key, f);
    }

    /// Queues a patch against one capture's task position.
    pub fn patch_task_position<F>(&mut self, capture_id: &CaptureId, f: F)
    where
        F: Fn(Option<TaskPosition>) -> CdcResult<(Option<TaskPosition>, bool)>
            + Send
            + Sync
            + 'static,
    {
        let key = RecordKey::TaskPosition {
            changefeed_id: self.id.clone(),
            capture_id: capture_id.clone(),
        };
        self.queue_typed(key, f);
    }

    /// Queues a patch against one capture's task workload.
    pub fn patch_task_workload<F>(&mut self, capture_id: &CaptureId, f: F)
    where
        F: Fn(Option<TaskWorkload>) -> CdcResult<(Option<TaskWorkload>, bool)>
            + Send
            + Sync
            + 'static,
    {
        let key = RecordKey::TaskWorkload {
            changefeed_id: self.id.clone(),
            capture_id: capture_id.clone(),
        };
        self.queue_typed(key, f);
    }

    /// Wraps a typed patch closure into a byte-level [`DataPatch`].
    ///
    /// The wrapper decodes the base value fresh on every invocation, so the
    /// resulting patch stays pure and can be replayed by the store against a
    /// different base after a compare-and-swap conflict.
    fn queue_typed<T, F>(&mut self, key: RecordKey, f: F)
    where
        T: Serialize + DeserializeOwned + 'static,
        F: Fn(Option<T>) -> CdcResult<(Option<T>, bool)> + Send + Sync + 'static,
    {
        let fun: PatchFn = Arc::new(move |base: Option<&[u8]>| {
            let decoded = base.map(serde_json::from_slice::<T>).transpose()?;
            let (next, changed) = f(decoded)?;
            let encoded = next.as_ref().map(serde_json::to_vec).transpose()?;
            Ok((encoded, changed))
        });
        self.pending_patches.push(DataPatch::new(key, fun));
    }

    pub fn has_pending_patches(&self) -> bool {
        !self.pending_patches.is_empty()
    }

    /// Drains the queued patches into a batch, stamped with the revision at
    /// which this mirror last observed each touched record.
    pub fn take_patch_batch(&mut self) -> PatchBatch {
        let patches = std::mem::take(&mut self.pending_patches);
        let mut base_revisions = HashMap::new();
        for patch in &patches {
            let revision = self
                .observed_revisions
                .get(&patch.key)
                .copied()
                .unwrap_or(0);
            base_revisions.insert(patch.key.clone(), revision);
        }

        PatchBatch {
            patches,
            base_revisions,
        }
    }

    /// Refreshes one mirrored record from a store-reported post-apply value.
    ///
    /// `None` means the record was observed absent (deleted or never
    /// created). Keys belonging to another changefeed are rejected.
    pub fn update(&mut self, key: &RecordKey, value: Option<&VersionedValue>) -> CdcResult<()> {
        if key.changefeed_id() != &self.id {
            bail!(
                ErrorKind::InvalidRecordKey,
                "Record key belongs to another changefeed",
                key
            );
        }

        match value {
            Some(versioned) => {
                self.observed_revisions
                    .insert(key.clone(), versioned.mod_revision);
            }
            None => {
                self.observed_revisions.remove(key);
            }
        }

        let raw = value.map(|versioned| versioned.value.as_slice());
        match key {
            RecordKey::Info { .. } => {
                self.info = raw.map(serde_json::from_slice).transpose()?;
            }
            RecordKey::Status { .. } => {
                self.status = raw.map(serde_json::from_slice).transpose()?;
            }
            RecordKey::TaskStatus { capture_id, .. } => match raw {
                Some(raw) => {
                    self.task_statuses
                        .insert(capture_id.clone(), serde_json::from_slice(raw)?);
                }
                None => {
                    self.task_statuses.remove(capture_id);
                }
            },
            RecordKey::TaskPosition { capture_id, .. } => match raw {
                Some(raw) => {
                    self.task_positions
                        .insert(capture_id.clone(), serde_json::from_slice(raw)?);
                }
                None => {
                    self.task_positions.remove(capture_id);
                }
            },
            RecordKey::TaskWorkload { capture_id, .. } => match raw {
                Some(raw) => {
                    self.workloads
                        .insert(capture_id.clone(), serde_json::from_slice(raw)?);
                }
                None => {
                    self.workloads.remove(capture_id);
                }
            },
        }

        Ok(())
    }

    /// Returns every capture that still owns a record under this changefeed,
    /// in deterministic order.
    pub fn active_captures(&self) -> BTreeSet<CaptureId> {
        self.task_statuses
            .keys()
            .chain(self.task_positions.keys())
            .chain(self.workloads.keys())
            .cloned()
            .collect()
    }
}
