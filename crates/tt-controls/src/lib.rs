//! Control core for thermotune.
//!
//! This crate holds the discrete-time PID loop and the relay-feedback
//! autotuner that derives PID gains from a live oscillation experiment.
//!
//! # Architecture
//!
//! Everything runs inside one caller-owned periodic tick:
//! - [`PidController::compute`] turns a measurement and setpoint into an output
//! - [`RelayAutotuner::step`] drives the output between two relay levels and,
//!   once the induced oscillation settles, resolves gains through a
//!   [`TuningRuleTable`] rule or the adaptive AMIGOf formula
//! - [`SampleClock`] gates both on their sample interval
//!
//! Neither component reads a clock or touches hardware. Timestamps come in as
//! milliseconds, outputs go back as plain `f64` values.
//!
//! # Design Principles
//!
//! - **Explicit data flow**: measurement, setpoint and output are parameters
//! - **Last-good state**: rejected settings leave prior state intact
//! - **Never throws while tuning**: every failure ends in `AutotuneState::Failed`

pub mod autotune;
pub mod error;
pub mod pid;
pub mod rules;
pub mod sampled;

pub use autotune::{
    AutotuneConfig, AutotuneResult, AutotuneState, RelayAutotuner, TickResult, TuneFailure,
};
pub use error::{ControlError, ControlResult};
pub use pid::{Direction, Mode, PidController};
pub use rules::{RuleGains, TuningMethod, TuningRule, TuningRuleTable};
pub use sampled::{SampleClock, SampleConfig};
