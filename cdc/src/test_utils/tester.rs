use std::collections::BTreeSet;

use crate::model::ChangefeedId;
use crate::orchestrator::patch::RecordKey;
use crate::orchestrator::state::ChangefeedState;
use crate::orchestrator::store::{MemoryStateStore, StateStore};

/// Couples a changefeed state mirror with an in-memory store, driving the
/// queue-apply-refresh cycle that the owner loop performs in production.
#[derive(Debug)]
pub struct ChangefeedStateTester {
    pub state: ChangefeedState,
    pub store: MemoryStateStore,
}

impl ChangefeedStateTester {
    pub fn new(changefeed_id: ChangefeedId) -> Self {
        Self {
            state: ChangefeedState::new(changefeed_id),
            store: MemoryStateStore::new(),
        }
    }

    /// Wraps an existing store, for tests that simulate several actors
    /// sharing one coordination service.
    pub fn with_store(changefeed_id: ChangefeedId, store: MemoryStateStore) -> Self {
        Self {
            state: ChangefeedState::new(changefeed_id),
            store,
        }
    }

    /// Submits the pending patch batch to the store and reflects every
    /// post-apply value back into the mirror.
    ///
    /// Panics if any patch fails: in production a dirty report makes the
    /// owner loop retry the whole reconciliation cycle.
    pub async fn must_apply_patches(&mut self) {
        let batch = self.state.take_patch_batch();
        if batch.is_empty() {
            return;
        }

        let report = self
            .store
            .apply_patches(batch)
            .await
            .expect("state store must accept the batch");
        assert!(report.is_clean(), "patch batch failed: {report:?}");

        for (key, value) in report.changed {
            self.state
                .update(&key, value.as_ref())
                .expect("post-apply value must refresh the mirror");
        }
    }

    /// Resynchronizes the whole mirror from the store, picking up writes made
    /// by other actors.
    pub async fn refresh_from_store(&mut self) {
        let snapshot = self
            .store
            .snapshot(self.state.id())
            .await
            .expect("state store must produce a snapshot");

        let mut keys: BTreeSet<RecordKey> = snapshot.keys().cloned().collect();
        keys.extend(self.mirrored_keys());

        for key in keys {
            self.state
                .update(&key, snapshot.get(&key))
                .expect("snapshot value must refresh the mirror");
        }
    }

    /// Returns the keys of every record currently held by the mirror, so a
    /// refresh can also observe deletions.
    fn mirrored_keys(&self) -> BTreeSet<RecordKey> {
        let changefeed_id = self.state.id().clone();
        let mut keys = BTreeSet::new();

        if self.state.info.is_some() {
            keys.insert(RecordKey::Info {
                changefeed_id: changefeed_id.clone(),
            });
        }
        if self.state.status.is_some() {
            keys.insert(RecordKey::Status {
                changefeed_id: changefeed_id.clone(),
            });
        }
        for capture_id in self.state.task_statuses.keys() {
            keys.insert(RecordKey::TaskStatus {
                changefeed_id: changefeed_id.clone(),
                capture_id: capture_id.clone(),
            });
        }
        for capture_id in self.state.task_positions.keys() {
            keys.insert(RecordKey::TaskPosition {
                changefeed_id: changefeed_id.clone(),
                capture_id: capture_id.clone(),
            });
        }
        for capture_id in self.state.workloads.keys() {
            keys.insert(RecordKey::TaskWorkload {
                changefeed_id: changefeed_id.clone(),
                capture_id: capture_id.clone(),
            });
        }

        keys
    }
}
