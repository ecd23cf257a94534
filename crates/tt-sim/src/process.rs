//! First-order-plus-dead-time process.
//!
//! Dynamics: `tau * dy/dt = y0 + K * (u(t - theta) - u0) + d - y`
//!
//! - `K`: static process gain (measurement units per output unit)
//! - `tau`: time constant in seconds
//! - `theta`: dead time, rounded to whole sample periods
//! - `u0`, `y0`: operating point (output and measurement at rest)
//! - `d`: additive load disturbance
//!
//! Integration uses the exact zero-order-hold solution for one sample, so
//! the model is stable for any `dt`.
//!
//! # Example
//!
//! ```
//! use tt_sim::{FirstOrderProcess, ProcessParams};
//!
//! let params = ProcessParams {
//!     gain: 2.0,
//!     time_constant_s: 10.0,
//!     dead_time_s: 0.0,
//!     baseline_output: 0.0,
//!     baseline_value: 20.0,
//!     dt_s: 0.5,
//! };
//! let mut process = FirstOrderProcess::new(params).unwrap();
//!
//! // Step the output to 10 and wait five time constants
//! for _ in 0..100 {
//!     process.step(10.0);
//! }
//!
//! // Measurement approaches 20 + 2 * 10
//! assert!((process.value() - 40.0).abs() < 0.5);
//! ```

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tt_core::{ensure_finite, ensure_positive};

use crate::error::{SimError, SimResult};

/// Longest delay line a process will allocate.
pub const MAX_DELAY_SAMPLES: usize = 1 << 20;

/// Process parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessParams {
    /// Static gain
    pub gain: f64,
    /// Time constant (seconds), must be positive
    pub time_constant_s: f64,
    /// Dead time (seconds), non-negative
    pub dead_time_s: f64,
    /// Output at the operating point
    pub baseline_output: f64,
    /// Measurement at the operating point
    pub baseline_value: f64,
    /// Sample period (seconds), must be positive
    pub dt_s: f64,
}

impl Default for ProcessParams {
    /// Slow heater: gain 2, 100 s lag, 10 s dead time, resting at 100 with
    /// 50% output.
    fn default() -> Self {
        Self {
            gain: 2.0,
            time_constant_s: 100.0,
            dead_time_s: 10.0,
            baseline_output: 50.0,
            baseline_value: 100.0,
            dt_s: 0.25,
        }
    }
}

impl ProcessParams {
    pub fn validate(&self) -> SimResult<()> {
        ensure_finite(self.gain, "gain")?;
        ensure_positive(self.time_constant_s, "time constant")?;
        ensure_positive(self.dt_s, "sample period")?;
        ensure_finite(self.baseline_output, "baseline output")?;
        ensure_finite(self.baseline_value, "baseline value")?;
        if !(self.dead_time_s >= 0.0) || !self.dead_time_s.is_finite() {
            return Err(SimError::NonPhysical {
                what: "dead time must be finite and non-negative",
            });
        }
        if self.dead_time_s / self.dt_s > MAX_DELAY_SAMPLES as f64 {
            return Err(SimError::InvalidArg {
                what: "dead time spans too many sample periods",
            });
        }
        Ok(())
    }

    /// Dead time in whole sample periods.
    pub fn delay_samples(&self) -> usize {
        (self.dead_time_s / self.dt_s).round() as usize
    }
}

/// Simulated process state.
#[derive(Clone, Debug)]
pub struct FirstOrderProcess {
    params: ProcessParams,
    value: f64,
    disturbance: f64,
    decay: f64,
    delay_line: VecDeque<f64>,
}

impl FirstOrderProcess {
    /// Create a process at rest at its operating point.
    ///
    /// # Errors
    ///
    /// Returns error if any parameter is non-finite, `time_constant_s` or
    /// `dt_s` is not positive, or `dead_time_s` is negative.
    pub fn new(params: ProcessParams) -> SimResult<Self> {
        params.validate()?;
        let delay = params.delay_samples();
        Ok(Self {
            params,
            value: params.baseline_value,
            disturbance: 0.0,
            decay: (-params.dt_s / params.time_constant_s).exp(),
            delay_line: std::iter::repeat_n(params.baseline_output, delay).collect(),
        })
    }

    pub fn params(&self) -> &ProcessParams {
        &self.params
    }

    /// Current measurement.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn disturbance(&self) -> f64 {
        self.disturbance
    }

    /// Set an additive load disturbance on the steady-state measurement.
    pub fn set_disturbance(&mut self, disturbance: f64) -> SimResult<()> {
        self.disturbance = ensure_finite(disturbance, "disturbance")?;
        tracing::debug!(disturbance, "load disturbance set");
        Ok(())
    }

    /// Steady-state measurement for a constant `output`.
    pub fn steady_state(&self, output: f64) -> f64 {
        self.params.baseline_value
            + self.params.gain * (output - self.params.baseline_output)
            + self.disturbance
    }

    /// Advance one sample period with `output` applied, returning the new
    /// measurement.
    pub fn step(&mut self, output: f64) -> f64 {
        self.delay_line.push_back(output);
        let delayed = self.delay_line.pop_front().unwrap_or(output);
        let target = self.steady_state(delayed);
        self.value = target + (self.value - target) * self.decay;
        self.value
    }

    /// Return to the operating point, clearing the disturbance.
    pub fn reset(&mut self) {
        self.value = self.params.baseline_value;
        self.disturbance = 0.0;
        for slot in self.delay_line.iter_mut() {
            *slot = self.params.baseline_output;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ProcessParams {
        ProcessParams {
            gain: 1.5,
            time_constant_s: 10.0,
            dead_time_s: 0.0,
            baseline_output: 0.0,
            baseline_value: 0.0,
            dt_s: 0.1,
        }
    }

    #[test]
    fn first_order_step_response() {
        let mut p = FirstOrderProcess::new(params()).unwrap();
        for _ in 0..100 {
            p.step(1.0);
        }
        // One time constant: 63.2% of the final value
        let expected = 1.5 * (1.0 - (-1.0f64).exp());
        assert!((p.value() - expected).abs() < 1e-9);
    }

    #[test]
    fn dead_time_delays_response() {
        let mut p = FirstOrderProcess::new(ProcessParams {
            dead_time_s: 1.0,
            ..params()
        })
        .unwrap();
        assert_eq!(p.params().delay_samples(), 10);
        for _ in 0..10 {
            p.step(1.0);
            assert_eq!(p.value(), 0.0);
        }
        p.step(1.0);
        assert!(p.value() > 0.0);
    }

    #[test]
    fn disturbance_shifts_steady_state() {
        let mut p = FirstOrderProcess::new(params()).unwrap();
        p.set_disturbance(-2.0).unwrap();
        assert_eq!(p.steady_state(1.0), -0.5);
        for _ in 0..2000 {
            p.step(1.0);
        }
        assert!((p.value() + 0.5).abs() < 1e-6);
        assert!(p.set_disturbance(f64::NAN).is_err());
    }

    #[test]
    fn reset_returns_to_operating_point() {
        let mut p = FirstOrderProcess::new(ProcessParams::default()).unwrap();
        p.set_disturbance(3.0).unwrap();
        for _ in 0..500 {
            p.step(80.0);
        }
        p.reset();
        assert_eq!(p.value(), 100.0);
        assert_eq!(p.disturbance(), 0.0);
        // Delay line holds the baseline output again
        p.step(80.0);
        assert_eq!(p.value(), 100.0);
    }

    #[test]
    fn invalid_params() {
        let bad_tau = ProcessParams {
            time_constant_s: 0.0,
            ..params()
        };
        assert!(FirstOrderProcess::new(bad_tau).is_err());

        let bad_dt = ProcessParams {
            dt_s: -1.0,
            ..params()
        };
        assert!(FirstOrderProcess::new(bad_dt).is_err());

        let bad_delay = ProcessParams {
            dead_time_s: -0.5,
            ..params()
        };
        assert!(matches!(
            FirstOrderProcess::new(bad_delay),
            Err(SimError::NonPhysical { .. })
        ));

        let nan_gain = ProcessParams {
            gain: f64::NAN,
            ..params()
        };
        assert!(matches!(
            FirstOrderProcess::new(nan_gain),
            Err(SimError::Core(_))
        ));

        let huge_delay = ProcessParams {
            dead_time_s: 1.0e9,
            ..params()
        };
        assert!(matches!(
            FirstOrderProcess::new(huge_delay),
            Err(SimError::InvalidArg { .. })
        ));
    }
}
