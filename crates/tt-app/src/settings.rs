//! Controller settings file: schema, YAML load/save and validation.
//!
//! Every value a user can enter is stored in its fixed-point form so a
//! save/load cycle reproduces it exactly. Missing fields take the controller
//! defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tt_controls::{AutotuneConfig, Direction, Mode};
use tt_core::{Gain, Millis, Setpoint, Step};
use tt_sim::ProcessParams;

use crate::error::{AppError, AppResult};

/// Current settings schema version.
pub const LATEST_VERSION: u32 = 1;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

impl ValidationError {
    fn invalid(field: &str, value: impl ToString, reason: impl ToString) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// User-facing PID gains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainSettings {
    pub kp: Gain,
    /// Integral gain per second.
    pub ki: Gain,
    /// Derivative gain in seconds.
    pub kd: Gain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    pub version: u32,
    pub gains: GainSettings,
    pub direction: Direction,
    pub mode: Mode,
    pub sample_time_ms: Millis,
    pub output_min: f64,
    pub output_max: f64,
    pub setpoint: Setpoint,
    /// Output held in Manual mode.
    pub manual_output: Step,
    pub autotune: AutotuneConfig,
    /// Simulated process for offline sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plant: Option<ProcessParams>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            version: LATEST_VERSION,
            gains: GainSettings::default(),
            direction: Direction::Direct,
            mode: Mode::Manual,
            sample_time_ms: 1000,
            output_min: 0.0,
            output_max: 100.0,
            setpoint: Setpoint::ZERO,
            manual_output: Step::ZERO,
            autotune: AutotuneConfig::default(),
            plant: None,
        }
    }
}

pub fn validate_settings(settings: &ControllerSettings) -> Result<(), ValidationError> {
    if settings.version > LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: settings.version,
        });
    }

    let gains = [
        ("gains.kp", settings.gains.kp),
        ("gains.ki", settings.gains.ki),
        ("gains.kd", settings.gains.kd),
    ];
    for (field, gain) in gains {
        if gain.is_negative() {
            return Err(ValidationError::invalid(field, gain, "must be non-negative"));
        }
    }

    if settings.sample_time_ms == 0 {
        return Err(ValidationError::invalid(
            "sample_time_ms",
            settings.sample_time_ms,
            "must be positive",
        ));
    }

    let (min, max) = (settings.output_min, settings.output_max);
    if !min.is_finite() || !max.is_finite() || min >= max {
        return Err(ValidationError::invalid(
            "output_min",
            format!("{min}..{max}"),
            "limits must be finite with min < max",
        ));
    }

    let manual = settings.manual_output.to_f64();
    if manual < min || manual > max {
        return Err(ValidationError::invalid(
            "manual_output",
            settings.manual_output,
            "outside output limits",
        ));
    }

    if settings.autotune.output_step.is_negative() {
        return Err(ValidationError::invalid(
            "autotune.output_step",
            settings.autotune.output_step,
            "must be non-negative",
        ));
    }
    if settings.autotune.noise_band.is_negative() {
        return Err(ValidationError::invalid(
            "autotune.noise_band",
            settings.autotune.noise_band,
            "must be non-negative",
        ));
    }

    if let Some(plant) = &settings.plant {
        plant
            .validate()
            .map_err(|e| ValidationError::invalid("plant", "..", e))?;
    }

    Ok(())
}

/// Parse and validate settings from YAML text.
pub fn settings_from_str(content: &str) -> AppResult<ControllerSettings> {
    let settings: ControllerSettings = serde_yaml::from_str(content)?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// Load settings from a YAML file.
pub fn load_settings(path: &Path) -> AppResult<ControllerSettings> {
    let content = std::fs::read_to_string(path).map_err(|e| AppError::SettingsFileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    settings_from_str(&content)
}

/// Validate and save settings to a YAML file.
pub fn save_settings(path: &Path, settings: &ControllerSettings) -> AppResult<()> {
    validate_settings(settings)?;
    let content = serde_yaml::to_string(settings)?;
    std::fs::write(path, content).map_err(|e| AppError::SettingsFileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}
