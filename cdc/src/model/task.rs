use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::RunningError;

/// Unique identifier of a worker process (a "capture") in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptureId(String);

impl CaptureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CaptureId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a replicated table shard.
pub type TableId = u64;

/// Replication bookkeeping for one table assigned to a capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReplicaInfo {
    pub start_ts: u64,
}

/// Table assignment bookkeeping for one capture working on a changefeed.
///
/// Written by the scheduler and the capture itself; the feed-state manager
/// only deletes it at teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    #[serde(default)]
    pub tables: HashMap<TableId, TableReplicaInfo>,
}

/// Progress checkpoint reported by one capture.
///
/// The `error` field is a mailbox, not a log: the capture sets it, the
/// feed-state manager consumes and clears it on the next tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPosition {
    #[serde(default)]
    pub checkpoint_ts: u64,
    #[serde(default)]
    pub resolved_ts: u64,
    /// Number of events replicated since the position was created.
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub error: Option<RunningError>,
}

/// Load metric for one table on one capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadInfo {
    pub workload: u64,
}

/// Per-capture load summary, cleaned up alongside [`TaskStatus`] when a
/// changefeed finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskWorkload(pub HashMap<TableId, WorkloadInfo>);
