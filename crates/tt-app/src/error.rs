//! Error types for the tt-app service layer.

use std::path::PathBuf;

use crate::settings::ValidationError;

/// Application error type that wraps errors from the backend crates and
/// gives the CLI one error interface.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Failed to read settings file: {path}")]
    SettingsFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write settings file: {path}")]
    SettingsFileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Settings validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Control error: {0}")]
    Control(#[from] tt_controls::ControlError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] tt_sim::SimError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for tt-app operations.
pub type AppResult<T> = Result<T, AppError>;
