//! Relay levels and relay-bias asymmetry correction.
//!
//! A steady load disturbance makes the up and down relay steps last
//! different times. When the two durations differ by more than
//! [`STEP_ASYMMETRY_TOLERANCE`] the relay is biased so the oscillation
//! becomes symmetric again (Yu, *Autotuning of PID Controllers*, eq. 7.39).

use tt_core::{Millis, NEAR_ZERO, elapsed_ms};

use super::ring::RingBuffer;

/// Allowed relative difference between up and down step durations. Also the
/// smallest bias change, as a fraction of the step, worth applying.
pub const STEP_ASYMMETRY_TOLERANCE: f64 = 0.20;

/// The two relay output levels, centred on the starting output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayLevels {
    pub start: f64,
    pub step: f64,
    pub bias: f64,
    pub out_min: f64,
    pub out_max: f64,
}

impl RelayLevels {
    pub fn high(&self) -> f64 {
        self.start + self.step + self.bias
    }

    pub fn low(&self) -> f64 {
        self.start - self.step + self.bias
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.out_min, self.out_max)
    }

    /// Add `delta` to the bias, then clamp the high level to `out_max` and the
    /// low level to `out_min`. Step and bias are re-derived from the clamped
    /// levels so both stay reachable.
    pub fn apply_bias(&mut self, delta: f64) {
        self.bias += delta;
        let high = self.high().min(self.out_max);
        let low = self.low().max(self.out_min);
        self.step = 0.5 * (high - low);
        self.bias = high - self.start - self.step;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct RelayStep {
    start: Millis,
    /// Sum of the measurements taken during the step.
    sum: f64,
}

/// Start times and integrated measurements of recent relay steps, newest
/// first. Entry 0 is the step in progress.
#[derive(Debug, Clone)]
pub struct StepHistory {
    steps: RingBuffer<RelayStep, 5>,
    count: u32,
}

impl StepHistory {
    pub fn new(now: Millis) -> Self {
        let mut steps = RingBuffer::new();
        steps.push(RelayStep {
            start: now,
            sum: 0.0,
        });
        Self { steps, count: 0 }
    }

    /// Relay steps completed since the start or the last bias change.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn last_step_time(&self) -> Millis {
        self.steps.front().map_or(0, |s| s.start)
    }

    pub fn accumulate(&mut self, measurement: f64) {
        if let Some(step) = self.steps.front_mut() {
            step.sum += measurement;
        }
    }

    /// Move the start of the step in progress to `now`.
    pub fn restamp(&mut self, now: Millis) {
        if let Some(step) = self.steps.front_mut() {
            step.start = now;
        }
    }

    pub fn reset_sum(&mut self) {
        if let Some(step) = self.steps.front_mut() {
            step.sum = 0.0;
        }
    }

    /// Discard the history so the process can settle under a new bias.
    pub fn restart_count(&mut self) {
        self.count = 0;
    }

    /// Open a new relay step at `now`.
    pub fn begin_step(&mut self, now: Millis) {
        if self.count == 0 {
            self.steps.clear();
        }
        self.steps.push(RelayStep {
            start: now,
            sum: 0.0,
        });
        self.count += 1;
    }

    /// Bias change needed at a relay flip, if the last two cycles are
    /// asymmetric enough to warrant one.
    ///
    /// `stepping_down` is true when the relay has just switched to its low
    /// level.
    pub fn asymmetry_correction(&self, step: f64, stepping_down: bool) -> Option<f64> {
        if self.count <= 4 {
            return None;
        }
        let t = |i| self.steps.get(i).map(|s: RelayStep| s.start);
        let sum = |i| self.steps.get(i).map(|s: RelayStep| s.sum);
        let span = |a, b| Some(elapsed_ms(t(a)?, t(b)?) as f64);

        // Ratios only, no need to halve
        let avg_step1 = span(0, 1)? + span(2, 3)?;
        let avg_step2 = span(1, 2)? + span(3, 4)?;
        if avg_step1 < NEAR_ZERO || avg_step2 < NEAR_ZERO {
            return None;
        }
        let asymmetry = (avg_step1 - avg_step2).abs() / avg_step1.max(avg_step2);
        tracing::debug!(asymmetry, "relay step asymmetry");
        if asymmetry <= STEP_ASYMMETRY_TOLERANCE {
            return None;
        }

        let integral1 = sum(1)? + sum(3)?;
        let integral2 = sum(2)? + sum(4)?;
        let offset = process_value_offset(avg_step1, avg_step2, integral1, integral2);
        let mut delta = -offset * step;
        if stepping_down {
            delta = -delta;
        }
        (delta.abs() > step * STEP_ASYMMETRY_TOLERANCE).then_some(delta)
    }
}

/// Offset of the oscillation centre as a fraction of its amplitude.
///
/// Assumes a trapezoidal oscillation, stationary over the last two relay
/// cycles. `avg_step1`/`avg_step2` are the summed durations of alternate
/// steps and `integral1`/`integral2` the summed measurements over the same
/// steps. Solves
///
/// ```text
/// (r1 r2 + 3 r1 + 3 r2 + 1) d^2 - 2 (1 + r1)(1 - r2) d + (1 - r1)(1 - r2) = 0
/// ```
///
/// for `d` with `r1 = avg_step1 / avg_step2` and `r2 = integral1 / integral2`.
pub fn process_value_offset(avg_step1: f64, avg_step2: f64, integral1: f64, integral2: f64) -> f64 {
    if avg_step1 < NEAR_ZERO {
        return 1.0;
    }
    if avg_step2 < NEAR_ZERO {
        return -1.0;
    }
    let r1 = avg_step1 / avg_step2;

    if integral1 < NEAR_ZERO {
        return 1.0;
    }
    if integral2 < NEAR_ZERO {
        return -1.0;
    }
    let r2 = integral1 / integral2;

    let mut discriminant = (1.0 - r2) * (r1 * r1 - r2);
    if discriminant < NEAR_ZERO {
        discriminant = 0.0;
    }
    let root_sign = if r1 > 1.0 { 1.0 } else { -1.0 };
    ((1.0 + r1) * (1.0 - r2) + root_sign * discriminant.sqrt())
        / (r1 * r2 + 3.0 * r1 + 3.0 * r2 + 1.0)
}
