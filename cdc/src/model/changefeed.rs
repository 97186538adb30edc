use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier of a changefeed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangefeedId(String);

impl ChangefeedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChangefeedId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for ChangefeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a changefeed, persisted on [`ChangefeedInfo`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FeedState {
    /// The changefeed is healthy and workers should replicate for it.
    #[default]
    Normal,
    /// Replication is paused by an administrative stop; all records retained.
    Stopped,
    /// The changefeed is torn down; a removed changefeed accepts no further
    /// transitions except a re-issued removal.
    Removed,
    /// The changefeed reached its target and has no more work.
    Finished,
    /// The error-rate circuit breaker tripped; behaves like [`FeedState::Stopped`]
    /// but is a distinct, externally visible reason code.
    Error,
}

impl FeedState {
    /// Returns `true` if workers should be replicating for a changefeed in
    /// this state.
    pub fn should_run(&self) -> bool {
        matches!(self, FeedState::Normal)
    }
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Stopped => write!(f, "stopped"),
            Self::Removed => write!(f, "removed"),
            Self::Finished => write!(f, "finished"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// The last administrative action applied to a changefeed.
///
/// Kept in lock-step on both [`ChangefeedInfo`] and [`ChangefeedStatus`]
/// within a single reconciliation tick.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AdminJobType {
    #[default]
    None,
    Stop,
    Resume,
    Remove,
    Finish,
}

impl fmt::Display for AdminJobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Stop => write!(f, "stop"),
            Self::Resume => write!(f, "resume"),
            Self::Remove => write!(f, "remove"),
            Self::Finish => write!(f, "finish"),
        }
    }
}

/// Options carried by an administrative command.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminJobOption {
    /// Erase the changefeed's descriptor, status and every per-worker record
    /// instead of retaining them in the removed state.
    pub force_remove: bool,
}

/// An administrative command targeting one changefeed.
///
/// Transient: consumed by exactly one reconciliation tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminJob {
    pub changefeed_id: ChangefeedId,
    pub job_type: AdminJobType,
    #[serde(default)]
    pub opts: AdminJobOption,
}

/// An error reported by a worker process.
///
/// Immutable value object; the owner only aggregates these by count, it never
/// mutates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningError {
    /// Advertised address of the worker that reported the error.
    pub addr: String,
    /// Stable machine-readable tag, e.g. `"[CDC:ErrEtcdSessionDone]"`.
    pub code: String,
    pub message: String,
}

/// Replication configuration of a changefeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Whether table name filtering is case sensitive.
    pub case_sensitive: bool,
    /// Table filter rules in `db.table` glob form.
    pub filter_rules: Vec<String>,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            filter_rules: vec!["*.*".to_owned()],
        }
    }
}

/// The changefeed descriptor: sink target, replication configuration and the
/// lifecycle fields owned by the feed-state manager.
///
/// Created on first successful reconciliation, erased on force removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangefeedInfo {
    pub sink_uri: String,
    #[serde(default)]
    pub start_ts: u64,
    #[serde(default)]
    pub target_ts: u64,
    pub config: ReplicaConfig,
    #[serde(default)]
    pub state: FeedState,
    #[serde(default)]
    pub admin_job_type: AdminJobType,
    /// The most recent worker-reported error, retained for observability.
    #[serde(default)]
    pub error: Option<RunningError>,
    /// Unix-millisecond timestamps of recent worker-reported errors, pruned
    /// by the manager's GC window and cleared on resume.
    #[serde(default)]
    pub error_history: Vec<i64>,
}

impl ChangefeedInfo {
    pub fn new(sink_uri: impl Into<String>, config: ReplicaConfig) -> Self {
        Self {
            sink_uri: sink_uri.into(),
            start_ts: 0,
            target_ts: 0,
            config,
            state: FeedState::Normal,
            admin_job_type: AdminJobType::None,
            error: None,
            error_history: Vec::new(),
        }
    }
}

/// Runtime status mirror of a changefeed.
///
/// Carries its own [`AdminJobType`] kept in lock-step with the descriptor's;
/// same lifecycle as [`ChangefeedInfo`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangefeedStatus {
    #[serde(default)]
    pub resolved_ts: u64,
    #[serde(default)]
    pub checkpoint_ts: u64,
    #[serde(default)]
    pub admin_job_type: AdminJobType,
}
