use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration for a per-changefeed feed-state manager.
///
/// Controls the error-rate circuit breaker that forces a persistently
/// failing changefeed into the error state instead of retrying forever.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChangefeedManagerConfig {
    /// Number of worker-reported errors within the GC window that forces the
    /// changefeed into the error state.
    pub error_history_threshold: usize,
    /// Window, in milliseconds, after which recorded errors are garbage
    /// collected from the history and no longer count towards the threshold.
    pub error_history_gc_interval_ms: u64,
}

impl Default for ChangefeedManagerConfig {
    fn default() -> Self {
        Self {
            error_history_threshold: 5,
            error_history_gc_interval_ms: 600_000,
        }
    }
}

impl ChangefeedManagerConfig {
    /// Validates the manager configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.error_history_threshold == 0 {
            return Err(ValidationError::ErrorHistoryThresholdZero);
        }

        if self.error_history_gc_interval_ms == 0 {
            return Err(ValidationError::ErrorHistoryGcIntervalZero);
        }

        Ok(())
    }
}
