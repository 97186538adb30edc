//! Macros for control-plane error handling.
//!
//! Provides convenience macros for creating and returning
//! [`crate::error::CdcError`] instances with reduced boilerplate.

/// Creates a [`crate::error::CdcError`] from error kind and description.
///
/// Accepts either a static description or an additional dynamic detail value.
#[macro_export]
macro_rules! cdc_error {
    ($kind:expr, $desc:expr) => {
        CdcError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        CdcError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::CdcError`] from the current function.
///
/// Combines error creation with early return for error conditions that should
/// immediately terminate execution.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::cdc_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::cdc_error!($kind, $desc, $detail))
    };
}
