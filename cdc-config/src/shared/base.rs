use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The error-history circuit breaker cannot trigger on zero errors.
    #[error("`error_history_threshold` cannot be zero")]
    ErrorHistoryThresholdZero,
    /// A zero GC interval would discard every recorded error immediately.
    #[error("`error_history_gc_interval_ms` cannot be zero")]
    ErrorHistoryGcIntervalZero,
}
