//! Discrete PID controller.
//!
//! Features:
//! - Proportional action on error
//! - Integral action with anti-windup (accumulator clamped to the output range)
//! - Derivative on measurement, so setpoint changes do not kick the output
//! - Bumpless Manual -> Automatic transfer
//! - Direct/Reverse action
//!
//! Gains are entered as [`Gain`] values (per second for `ki`, seconds for
//! `kd`) and converted to per-sample effective gains internally.

use serde::{Deserialize, Serialize};
use tt_core::{Gain, Millis};
use tracing::debug;

use crate::error::{ControlError, ControlResult};
use crate::sampled::{SampleClock, SampleConfig};

/// Sign of the controller action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Output rises when the measurement is below the setpoint.
    #[default]
    Direct,
    /// Output rises when the measurement is above the setpoint.
    Reverse,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Direct => 1.0,
            Direction::Reverse => -1.0,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Direction::Direct => Direction::Reverse,
            Direction::Reverse => Direction::Direct,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Output is owned by the caller; `compute` does nothing.
    #[default]
    Manual,
    Automatic,
}

/// PID controller state and configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PidController {
    kp_display: Gain,
    ki_display: Gain,
    kd_display: Gain,
    // Effective gains: sign-adjusted and scaled to the sample interval.
    kp: f64,
    ki: f64,
    kd: f64,
    integral: f64,
    last_measurement: f64,
    output: f64,
    out_min: f64,
    out_max: f64,
    direction: Direction,
    mode: Mode,
    clock: SampleClock,
}

impl Default for PidController {
    /// Direct action, output range 0-100, one second sample interval.
    fn default() -> Self {
        Self::build(Direction::Direct, 0.0, 100.0, SampleConfig { interval_ms: 1000 })
    }
}

impl PidController {
    /// Create a controller with zero gains in Manual mode.
    ///
    /// # Arguments
    ///
    /// * `direction` - Controller action
    /// * `out_min` - Minimum output
    /// * `out_max` - Maximum output (must exceed `out_min`)
    /// * `sample_interval_ms` - Sample interval in milliseconds (must be positive)
    pub fn new(
        direction: Direction,
        out_min: f64,
        out_max: f64,
        sample_interval_ms: Millis,
    ) -> ControlResult<Self> {
        check_limits(out_min, out_max)?;
        let config = SampleConfig::new(sample_interval_ms)?;
        Ok(Self::build(direction, out_min, out_max, config))
    }

    fn build(direction: Direction, out_min: f64, out_max: f64, config: SampleConfig) -> Self {
        Self {
            kp_display: Gain::ZERO,
            ki_display: Gain::ZERO,
            kd_display: Gain::ZERO,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            integral: 0.0,
            last_measurement: 0.0,
            output: out_min,
            out_min,
            out_max,
            direction,
            mode: Mode::Manual,
            clock: SampleClock::new(config),
        }
    }

    /// Set the user-facing gains.
    ///
    /// Rejects any negative gain and leaves the previous tunings in place.
    pub fn set_tunings(&mut self, kp: Gain, ki: Gain, kd: Gain) -> ControlResult<()> {
        if kp.is_negative() || ki.is_negative() || kd.is_negative() {
            return Err(ControlError::InvalidArg {
                what: "gains must be non-negative",
            });
        }
        self.kp_display = kp;
        self.ki_display = ki;
        self.kd_display = kd;

        let dt = self.clock.config.interval_s();
        let sign = self.direction.sign();
        self.kp = sign * kp.to_f64();
        self.ki = sign * ki.to_f64() * dt;
        self.kd = sign * kd.to_f64() / dt;
        Ok(())
    }

    /// Change the sample interval, rescaling the effective integral and
    /// derivative gains so the user-facing gains keep their meaning.
    pub fn set_sample_time(&mut self, new_ms: Millis) -> ControlResult<()> {
        let old_ms = self.clock.interval_ms();
        self.clock.set_interval(new_ms)?;
        let ratio = new_ms as f64 / old_ms as f64;
        self.ki *= ratio;
        self.kd /= ratio;
        Ok(())
    }

    /// Change the output range. While Automatic, the current output and the
    /// integral accumulator are clamped into the new range at once.
    pub fn set_output_limits(&mut self, min: f64, max: f64) -> ControlResult<()> {
        check_limits(min, max)?;
        self.out_min = min;
        self.out_max = max;
        if self.mode == Mode::Automatic {
            self.output = self.clamp(self.output);
            self.integral = self.clamp(self.integral);
        }
        Ok(())
    }

    /// Switch mode.
    ///
    /// `measurement` and `output` are the current external input and output.
    /// They seed the controller on a Manual -> Automatic transition so the
    /// first automatic output continues from `output` without a jump.
    pub fn set_mode(&mut self, mode: Mode, measurement: f64, output: f64) {
        if mode == Mode::Automatic && self.mode == Mode::Manual {
            self.initialize(measurement, output);
        }
        self.mode = mode;
    }

    fn initialize(&mut self, measurement: f64, output: f64) {
        self.integral = self.clamp(output);
        self.output = self.clamp(output);
        self.last_measurement = measurement;
        self.clock.reset();
        debug!(
            integral = self.integral,
            measurement, "pid initialized for automatic mode"
        );
    }

    /// Change the controller action.
    ///
    /// The effective gains always carry the sign of the current direction, so
    /// an actual change negates all three exactly once. This holds in Manual
    /// mode too: [`effective_gains`](Self::effective_gains) reports negated
    /// values for a reverse-acting controller even while it is not computing,
    /// and a later switch to Automatic uses them as they are. Setting the
    /// current direction again is a no-op.
    pub fn set_controller_direction(&mut self, direction: Direction) {
        if direction != self.direction {
            self.kp = -self.kp;
            self.ki = -self.ki;
            self.kd = -self.kd;
        }
        self.direction = direction;
    }

    /// Run one PID computation.
    ///
    /// Returns `None` in Manual mode or when less than one sample interval has
    /// elapsed since the last computation.
    pub fn compute(&mut self, measurement: f64, setpoint: f64, now: Millis) -> Option<f64> {
        if self.mode == Mode::Manual || !self.clock.should_sample(now) {
            return None;
        }

        let error = setpoint - measurement;
        self.integral = self.clamp(self.integral + self.ki * error);
        let d_input = measurement - self.last_measurement;
        let output = self.clamp(self.kp * error + self.integral - self.kd * d_input);

        self.last_measurement = measurement;
        self.output = output;
        self.clock.mark(now);
        Some(output)
    }

    fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.out_min, self.out_max)
    }

    pub fn kp(&self) -> Gain {
        self.kp_display
    }

    pub fn ki(&self) -> Gain {
        self.ki_display
    }

    pub fn kd(&self) -> Gain {
        self.kd_display
    }

    /// Effective `(kp, ki, kd)` as applied each sample.
    pub fn effective_gains(&self) -> (f64, f64, f64) {
        (self.kp, self.ki, self.kd)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn sample_interval_ms(&self) -> Millis {
        self.clock.interval_ms()
    }

    pub fn output_limits(&self) -> (f64, f64) {
        (self.out_min, self.out_max)
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Last output produced (or seeded) by the controller.
    pub fn output(&self) -> f64 {
        self.output
    }
}

fn check_limits(min: f64, max: f64) -> ControlResult<()> {
    if !min.is_finite() || !max.is_finite() || min >= max {
        return Err(ControlError::InvalidLimits { min, max });
    }
    Ok(())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn gain_strategy() -> impl Strategy<Value = Gain> {
        (0i32..100_000).prop_map(Gain::from_mantissa)
    }

    proptest! {
        #[test]
        fn output_stays_within_limits(
            min in -100.0f64..0.0,
            span in 0.1f64..200.0,
            kp in gain_strategy(),
            ki in gain_strategy(),
            kd in gain_strategy(),
            reverse in any::<bool>(),
            readings in prop::collection::vec((-500.0f64..500.0, -500.0f64..500.0), 1..60),
        ) {
            let max = min + span;
            let mut pid = PidController::default();
            pid.set_output_limits(min, max).unwrap();
            pid.set_tunings(kp, ki, kd).unwrap();
            if reverse {
                pid.set_controller_direction(Direction::Reverse);
            }
            pid.set_mode(Mode::Automatic, 0.0, 1.0e6);
            for (i, (pv, sp)) in readings.iter().enumerate() {
                if let Some(out) = pid.compute(*pv, *sp, i as Millis * 1000) {
                    prop_assert!(out >= min && out <= max);
                }
                prop_assert!(pid.integral() >= min && pid.integral() <= max);
            }
        }

        #[test]
        fn tunings_are_stored_exactly(kp in gain_strategy(), ki in gain_strategy(), kd in gain_strategy()) {
            let mut pid = PidController::default();
            pid.set_tunings(kp, ki, kd).unwrap();
            prop_assert_eq!((pid.kp(), pid.ki(), pid.kd()), (kp, ki, kd));
        }

        #[test]
        fn negative_gain_never_applies(kp in gain_strategy(), bad in 1i32..100_000, slot in 0usize..3) {
            let mut pid = PidController::default();
            pid.set_tunings(kp, kp, kp).unwrap();
            let before = pid.clone();
            let neg = Gain::from_mantissa(-bad);
            let mut gains = [kp, kp, kp];
            gains[slot] = neg;
            prop_assert!(pid.set_tunings(gains[0], gains[1], gains[2]).is_err());
            prop_assert_eq!(pid, before);
        }

        #[test]
        fn double_reversal_restores_gains(kp in gain_strategy(), ki in gain_strategy(), kd in gain_strategy()) {
            let mut pid = PidController::default();
            pid.set_tunings(kp, ki, kd).unwrap();
            pid.set_mode(Mode::Automatic, 0.0, 0.0);
            let original = pid.effective_gains();
            pid.set_controller_direction(Direction::Reverse);
            let reversed = pid.effective_gains();
            prop_assert_eq!(reversed, (-original.0, -original.1, -original.2));
            pid.set_controller_direction(Direction::Direct);
            prop_assert_eq!(pid.effective_gains(), original);
        }

        #[test]
        fn first_automatic_output_is_bumpless(
            out in 0.0f64..100.0,
            pv in -50.0f64..150.0,
            kp in gain_strategy(),
            ki in gain_strategy(),
            kd in gain_strategy(),
        ) {
            let mut pid = PidController::default();
            pid.set_tunings(kp, ki, kd).unwrap();
            pid.set_mode(Mode::Automatic, pv, out);
            let first = pid.compute(pv, pv, 0).unwrap();
            prop_assert_eq!(first, out);
        }
    }
}
