//! Error types for simulated processes.

use thiserror::Error;

/// Errors encountered when configuring a simulated process.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Non-physical condition: {what}")]
    NonPhysical { what: &'static str },

    #[error(transparent)]
    Core(#[from] tt_core::CoreError),
}

pub type SimResult<T> = Result<T, SimError>;
