//! Shared application service layer for thermotune.
//!
//! This crate wires the control core into something a front end can drive:
//! a [`Supervisor`] that owns the PID controller and the autotuner, YAML
//! settings with validation, and simulated sessions against a
//! first-order process.

pub mod error;
pub mod progress;
pub mod session;
pub mod settings;
pub mod supervisor;

// Re-export key types for convenience
pub use error::{AppError, AppResult};
pub use progress::{AutotuneProgress, SessionProgressEvent, SessionStage};
pub use session::{
    MAX_SESSION_TICKS, SessionOptions, SessionReport, TraceRecord, TuneOutcome, run_session,
    run_session_with_progress,
};
pub use settings::{
    ControllerSettings, GainSettings, LATEST_VERSION, ValidationError, load_settings,
    save_settings, settings_from_str, validate_settings,
};
pub use supervisor::{CommittedGains, Supervisor, SupervisorTick, TuneEvent};
