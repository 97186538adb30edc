use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::CdcResult;
use crate::model::ChangefeedId;
use crate::orchestrator::patch::{PatchBatch, RecordKey};
use crate::orchestrator::store::base::{
    ApplyReport, PatchOutcome, StateStore, VersionedValue,
};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<RecordKey, VersionedValue>,
    revision: i64,
}

/// Deterministic in-memory [`StateStore`].
///
/// Performs the same per-record CAS-and-retry semantics as a real
/// coordination-service client, synchronously under one lock. Used as the
/// test double for the owner's reconciliation loop.
#[derive(Debug, Clone)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStateStore {
    async fn apply_patches(&self, batch: PatchBatch) -> CdcResult<ApplyReport> {
        let mut inner = self.inner.lock().await;

        // Group patch indices per record, preserving both the order in which
        // records were first touched and the queue order within a record.
        let mut group_order = Vec::new();
        let mut groups: HashMap<RecordKey, Vec<usize>> = HashMap::new();
        for (idx, patch) in batch.patches.iter().enumerate() {
            let indices = groups.entry(patch.key.clone()).or_insert_with(|| {
                group_order.push(patch.key.clone());
                Vec::new()
            });
            indices.push(idx);
        }

        let mut report = ApplyReport {
            outcomes: vec![PatchOutcome::NoOp; batch.patches.len()],
            changed: HashMap::new(),
        };

        for key in group_order {
            let indices = &groups[&key];
            let current = inner.records.get(&key);
            let current_revision = current.map(|v| v.mod_revision).unwrap_or(0);
            // A concurrent writer moved the record past the proposer's view:
            // the pure patch functions are simply recomputed against the
            // fresher value.
            let conflicted = current_revision != batch.base_revision(&key);
            if conflicted {
                tracing::debug!(
                    record = %key,
                    base_revision = batch.base_revision(&key),
                    current_revision,
                    "record changed by a concurrent writer, recomputing patches"
                );
            }

            let mut value = current.map(|v| v.value.clone());
            let mut any_changed = false;
            let mut failed = false;
            for &idx in indices {
                match batch.patches[idx].apply(value.as_deref()) {
                    Ok((next, changed)) => {
                        if changed {
                            report.outcomes[idx] = if conflicted {
                                PatchOutcome::ConflictRetried
                            } else {
                                PatchOutcome::Applied
                            };
                            value = next;
                            any_changed = true;
                        } else {
                            report.outcomes[idx] = PatchOutcome::NoOp;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(record = %key, error = %err, "patch function failed");
                        // All-or-nothing per record: the write is dropped,
                        // so every queued patch for this record reports
                        // failure, including ones already computed.
                        for &failed_idx in indices {
                            report.outcomes[failed_idx] = PatchOutcome::Failed;
                        }
                        failed = true;
                        break;
                    }
                }
            }

            if failed || !any_changed {
                continue;
            }

            inner.revision += 1;
            let revision = inner.revision;
            match value {
                Some(value) => {
                    let versioned = VersionedValue {
                        value,
                        mod_revision: revision,
                    };
                    inner.records.insert(key.clone(), versioned.clone());
                    report.changed.insert(key, Some(versioned));
                }
                None => {
                    inner.records.remove(&key);
                    report.changed.insert(key, None);
                }
            }
        }

        Ok(report)
    }

    async fn get(&self, key: &RecordKey) -> CdcResult<Option<VersionedValue>> {
        let inner = self.inner.lock().await;

        Ok(inner.records.get(key).cloned())
    }

    async fn snapshot(
        &self,
        changefeed_id: &ChangefeedId,
    ) -> CdcResult<HashMap<RecordKey, VersionedValue>> {
        let inner = self.inner.lock().await;

        Ok(inner
            .records
            .iter()
            .filter(|(key, _)| key.changefeed_id() == changefeed_id)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
