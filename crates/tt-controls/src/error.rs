//! Error types for control operations.

use thiserror::Error;

/// Result type for control operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors raised when a configuration change is rejected.
///
/// A rejected change never mutates the target: the controller or tuner keeps
/// its previous, valid settings.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Invalid argument provided to a control function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// Output limits with `min >= max` or non-finite bounds.
    #[error("Invalid output limits: min={min}, max={max}")]
    InvalidLimits { min: f64, max: f64 },

    /// Unknown tuning method name or index.
    #[error("Unknown tuning method: {what}")]
    UnknownMethod { what: String },

    /// Operation not allowed in the current state.
    #[error("Controller state error: {what}")]
    StateError { what: &'static str },
}
