//! Relay-feedback autotuner.
//!
//! The tuner replaces the PID output with a relay: the output sits at
//! `start + step` until the measurement rises above `setpoint + noise_band`,
//! then at `start - step` until it falls below `setpoint - noise_band`. The
//! process settles into a limit cycle whose amplitude and period give the
//! ultimate gain `Ku = 4 step / (pi A)` and ultimate period `Pu`, from which
//! gains are resolved with a [`TuningRuleTable`] rule or, for
//! [`TuningMethod::AmigofPi`], the adaptive AMIGOf formula.
//!
//! # States
//!
//! ```text
//! Off -> [SteadyStateAtBaseline -> SteadyStateAfterStepUp]  (AMIGOf only)
//!     -> RelayStepUp <-> RelayStepDown
//!     -> Converged | Failed
//! ```
//!
//! # Refinements
//!
//! - **Adaptive phase** (AMIGOf): a step test first measures the static
//!   process gain, then the noise band is adjusted until the relay loop runs
//!   near a 130° phase lag.
//! - **Relay bias** (runtime flag): asymmetric up/down step durations fold a
//!   bias into both relay levels to cancel a steady load disturbance.
//!
//! The tuner never returns an error from [`RelayAutotuner::step`]. Every
//! failure path ends in [`AutotuneState::Failed`] with the output restored to
//! its starting value.

mod bias;
mod peaks;
mod phase;
mod ring;

pub use bias::{RelayLevels, STEP_ASYMMETRY_TOLERANCE, StepHistory, process_value_offset};
pub use peaks::{
    Amplitude, MAX_LOOKBACK_SAMPLES, PEAK_HISTORY, Peak, PeakTracker, SampleWindow, WindowSample,
};
pub use phase::{
    PHASE_TARGET_RAD, PHASE_TOLERANCE_RAD, amigof_gains, fast_atan, phase_lag, rearmed_noise_band,
    within_target,
};
pub use ring::RingBuffer;

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use tt_core::{Millis, NEAR_ZERO, NoiseBand, Step, elapsed_ms};

use crate::error::{ControlError, ControlResult};
use crate::rules::{RuleGains, TuningMethod, TuningRuleTable};
use crate::sampled::{SampleClock, SampleConfig};

/// Largest allowed disagreement between the half spread of the last peaks
/// and the induced amplitude.
pub const PEAK_AMPLITUDE_TOLERANCE: f64 = 0.05;

/// Longest wait between peaks (or relay steps) before giving up.
pub const MAX_WAIT_MS: Millis = 5 * 60 * 1000;

/// Peak count at which an unconverged run fails.
pub const MAX_PEAKS: u32 = 20;

/// Peaks and relay steps needed before convergence is assessed.
const MIN_CYCLE_COUNT: u32 = 5;

/// Autotuner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutotuneState {
    #[default]
    Off,
    SteadyStateAtBaseline,
    SteadyStateAfterStepUp,
    RelayStepUp,
    RelayStepDown,
    Converged,
    Failed,
}

impl AutotuneState {
    /// The two settling phases of the AMIGOf step test.
    pub fn is_steady_phase(self) -> bool {
        matches!(
            self,
            AutotuneState::SteadyStateAtBaseline | AutotuneState::SteadyStateAfterStepUp
        )
    }

    /// States that drive the output to the high relay level.
    pub fn is_step_up_like(self) -> bool {
        matches!(
            self,
            AutotuneState::SteadyStateAfterStepUp | AutotuneState::RelayStepUp
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AutotuneState::Converged | AutotuneState::Failed)
    }
}

/// Why a tuning run ended in [`AutotuneState::Failed`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuneFailure {
    #[error("no peak or relay step for more than {} s", MAX_WAIT_MS / 1000)]
    Stalled,

    #[error("{} peaks without convergence", MAX_PEAKS)]
    TooManyPeaks,

    #[error("process gain estimate is not positive")]
    ProcessGainNotPositive,
}

/// Tunable autotuner parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutotuneConfig {
    pub method: TuningMethod,
    /// Relay amplitude around the starting output.
    pub output_step: Step,
    /// Half the relay hysteresis.
    pub noise_band: NoiseBand,
    /// How far back peaks are identified, in seconds.
    pub lookback_s: u32,
    /// Correct asymmetric relay steps with a bias.
    pub relay_bias: bool,
}

impl Default for AutotuneConfig {
    fn default() -> Self {
        Self {
            method: TuningMethod::default(),
            output_step: Step::from_mantissa(100),
            noise_band: NoiseBand::from_mantissa(500),
            lookback_s: 10,
            relay_bias: false,
        }
    }
}

impl AutotuneConfig {
    pub fn validate(&self) -> ControlResult<()> {
        if self.output_step.is_negative() {
            return Err(ControlError::InvalidArg {
                what: "output step must be non-negative",
            });
        }
        if self.noise_band.is_negative() {
            return Err(ControlError::InvalidArg {
                what: "noise band must be non-negative",
            });
        }
        Ok(())
    }
}

/// Window length and sample interval for a lookback in seconds.
///
/// Lookbacks under 25 s sample every 250 ms; longer ones keep 100 samples
/// and stretch the interval. Values under one second are raised to one.
pub fn lookback_sampling(lookback_s: u32) -> (usize, Millis) {
    let secs = lookback_s.max(1);
    if secs < 25 {
        (secs as usize * 4, 250)
    } else {
        (MAX_LOOKBACK_SAMPLES, secs as Millis * 10)
    }
}

/// Outcome of a converged run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutotuneResult {
    pub method: TuningMethod,
    pub ultimate_gain: f64,
    pub ultimate_period_s: f64,
    pub induced_amplitude: f64,
    pub kp: f64,
    /// Integral time in seconds.
    pub ti: f64,
    /// Derivative time in seconds.
    pub td: f64,
    /// Static process gain (AMIGOf only).
    pub process_gain: Option<f64>,
    /// Phase lag in radians (AMIGOf only).
    pub phase_lag: Option<f64>,
}

impl AutotuneResult {
    pub fn ki(&self) -> f64 {
        self.kp / self.ti
    }

    pub fn kd(&self) -> f64 {
        self.kp * self.td
    }
}

/// Result of one [`RelayAutotuner::step`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum TickResult {
    /// Not armed, or the last run already finished.
    Idle,
    /// Sample interval not yet elapsed; hold the previous output.
    Waiting,
    Running {
        output: f64,
    },
    Converged {
        output: f64,
        result: AutotuneResult,
    },
    Failed {
        output: f64,
        reason: TuneFailure,
    },
}

impl TickResult {
    /// New output to apply, if any.
    pub fn output(&self) -> Option<f64> {
        match self {
            TickResult::Idle | TickResult::Waiting => None,
            TickResult::Running { output }
            | TickResult::Converged { output, .. }
            | TickResult::Failed { output, .. } => Some(*output),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TickResult::Converged { .. } | TickResult::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct Arming {
    output_start: f64,
    out_min: f64,
    out_max: f64,
}

enum Advance {
    Continue,
    Converged(AutotuneResult),
    Failed(TuneFailure),
}

/// Working state of one tuning run.
#[derive(Debug, Clone)]
struct TuningRun {
    state: AutotuneState,
    method: TuningMethod,
    setpoint: f64,
    levels: RelayLevels,
    noise_band: f64,
    /// Noise band applied at the next relay flip.
    next_noise_band: f64,
    window: SampleWindow,
    peaks: PeakTracker,
    steps: Option<StepHistory>,
    baseline_level: f64,
    process_gain: Option<f64>,
    /// Output latched after the relay check of the latest tick.
    output: f64,
}

impl TuningRun {
    fn new(
        config: &AutotuneConfig,
        window_len: usize,
        arming: Arming,
        step: f64,
        measurement: f64,
        now: Millis,
    ) -> Self {
        let noise_band = config.noise_band.to_f64();
        let state = if config.method.is_adaptive() {
            AutotuneState::SteadyStateAtBaseline
        } else {
            AutotuneState::RelayStepUp
        };
        let levels = RelayLevels {
            start: arming.output_start,
            step,
            bias: 0.0,
            out_min: arming.out_min,
            out_max: arming.out_max,
        };
        Self {
            state,
            method: config.method,
            setpoint: measurement,
            levels,
            noise_band,
            next_noise_band: noise_band,
            window: SampleWindow::new(window_len, measurement),
            peaks: PeakTracker::new(measurement, now),
            steps: config.relay_bias.then(|| StepHistory::new(now)),
            baseline_level: measurement,
            process_gain: None,
            output: levels.clamp(arming.output_start),
        }
    }

    /// Output for the current relay state. Baseline holds the start value.
    fn relay_output(&self) -> f64 {
        let raw = if self.state.is_step_up_like() {
            self.levels.high()
        } else if self.state == AutotuneState::RelayStepDown {
            self.levels.low()
        } else {
            self.levels.start
        };
        self.levels.clamp(raw)
    }

    fn advance(&mut self, measurement: f64, now: Millis) -> Advance {
        if let Some(steps) = self.steps.as_mut() {
            steps.accumulate(measurement);
        }

        let flipped = match self.state {
            AutotuneState::RelayStepUp if measurement > self.setpoint + self.noise_band => {
                self.state = AutotuneState::RelayStepDown;
                true
            }
            AutotuneState::RelayStepDown if measurement < self.setpoint - self.noise_band => {
                self.state = AutotuneState::RelayStepUp;
                true
            }
            _ => false,
        };
        if flipped {
            self.on_relay_flip(now);
        }
        // Steady-phase transitions below take effect on the next tick
        self.output = self.relay_output();

        let Some(sample) = self.window.push(measurement) else {
            if self.window.is_full() {
                // Stall timing starts once extremes can be trusted
                self.peaks.restart_timer(now);
            }
            return Advance::Continue;
        };

        if self.state.is_steady_phase() {
            if let Some(outcome) = self.track_steady_state(&sample, now) {
                return outcome;
            }
        } else {
            let alternated = self.peaks.record(&sample, measurement, now);
            if alternated {
                debug!(peak_count = self.peaks.count(), value = measurement, "peak");
                if self.ready_for_convergence() {
                    if let Some(result) = self.check_convergence() {
                        return Advance::Converged(result);
                    }
                }
            }
        }

        self.check_failure(now)
    }

    fn on_relay_flip(&mut self, now: Millis) {
        self.noise_band = self.next_noise_band;
        debug!(state = ?self.state, noise_band = self.noise_band, "relay flip");

        let Some(steps) = self.steps.as_mut() else {
            return;
        };
        let stepping_down = self.state == AutotuneState::RelayStepDown;
        if let Some(delta) = steps.asymmetry_correction(self.levels.step, stepping_down) {
            self.levels.apply_bias(delta);
            steps.restart_count();
            debug!(
                delta,
                bias = self.levels.bias,
                step = self.levels.step,
                "relay bias updated"
            );
        }
        steps.begin_step(now);
    }

    fn track_steady_state(&mut self, sample: &WindowSample, now: Millis) -> Option<Advance> {
        if sample.spread > 2.0 * self.noise_band {
            return None;
        }
        self.peaks.restart_timer(now);
        if let Some(steps) = self.steps.as_mut() {
            steps.restamp(now);
        }
        info!(level = sample.level, state = ?self.state, "process settled");

        if self.state == AutotuneState::SteadyStateAtBaseline {
            self.baseline_level = sample.level;
            self.window.restart(sample.level);
            self.state = AutotuneState::SteadyStateAfterStepUp;
            return None;
        }

        let gain = (sample.level - self.baseline_level) / self.levels.step;
        info!(process_gain = gain, "process gain");
        if !(gain.is_finite() && gain >= NEAR_ZERO) {
            return Some(Advance::Failed(TuneFailure::ProcessGainNotPositive));
        }
        self.process_gain = Some(gain);
        self.state = AutotuneState::RelayStepDown;
        if let Some(steps) = self.steps.as_mut() {
            steps.reset_sum();
        }
        None
    }

    fn ready_for_convergence(&self) -> bool {
        let steps_ready = self
            .steps
            .as_ref()
            .is_none_or(|s| s.count() >= MIN_CYCLE_COUNT);
        self.peaks.count() >= MIN_CYCLE_COUNT && steps_ready
    }

    fn check_convergence(&mut self) -> Option<AutotuneResult> {
        let amplitude = self.peaks.amplitude()?;
        if amplitude.induced < NEAR_ZERO {
            return None;
        }
        let criterion = amplitude.convergence_criterion();
        debug!(
            amplitude = amplitude.induced,
            abs_max = amplitude.abs_max,
            abs_min = amplitude.abs_min,
            criterion,
            "convergence check"
        );

        let mut lag = None;
        if self.method.is_adaptive() {
            let current = phase_lag(self.noise_band, amplitude.induced);
            debug!(phase_lag_deg = current.to_degrees(), "phase lag");
            if !within_target(current) {
                self.next_noise_band = rearmed_noise_band(amplitude.induced);
                debug!(noise_band = self.next_noise_band, "noise band re-armed");
                return None;
            }
            lag = Some(current);
        }

        if criterion >= PEAK_AMPLITUDE_TOLERANCE {
            return None;
        }
        self.resolve(amplitude.induced, lag)
    }

    fn resolve(&self, induced: f64, lag: Option<f64>) -> Option<AutotuneResult> {
        let ultimate_gain = (4.0 / PI) * (self.levels.step / induced);
        let ultimate_period_s = self.peaks.ultimate_period_s()?;
        info!(ultimate_gain, ultimate_period_s, "oscillation converged");

        let gains: RuleGains = match lag {
            Some(lag) => amigof_gains(ultimate_gain, ultimate_period_s, self.process_gain?, lag),
            None => TuningRuleTable::lookup(self.method)?.apply(ultimate_gain, ultimate_period_s),
        };
        Some(AutotuneResult {
            method: self.method,
            ultimate_gain,
            ultimate_period_s,
            induced_amplitude: induced,
            kp: gains.kp,
            ti: gains.ti,
            td: gains.td,
            process_gain: self.process_gain,
            phase_lag: lag,
        })
    }

    fn check_failure(&self, now: Millis) -> Advance {
        let peak_wait = elapsed_ms(now, self.peaks.last_alternation());
        let step_wait = self
            .steps
            .as_ref()
            .map_or(0, |s| elapsed_ms(now, s.last_step_time()));
        if peak_wait > MAX_WAIT_MS || step_wait > MAX_WAIT_MS {
            return Advance::Failed(TuneFailure::Stalled);
        }
        if self.peaks.count() >= MAX_PEAKS {
            return Advance::Failed(TuneFailure::TooManyPeaks);
        }
        Advance::Continue
    }
}

/// Relay-feedback autotuner.
///
/// Arm with [`start`](Self::start), then call [`step`](Self::step) every
/// tick with the current measurement until it reports a terminal result.
#[derive(Debug, Clone)]
pub struct RelayAutotuner {
    config: AutotuneConfig,
    window_len: usize,
    clock: SampleClock,
    state: AutotuneState,
    armed: Option<Arming>,
    run: Option<TuningRun>,
    result: Option<AutotuneResult>,
    failure: Option<TuneFailure>,
}

impl Default for RelayAutotuner {
    fn default() -> Self {
        let config = AutotuneConfig::default();
        let (window_len, interval_ms) = lookback_sampling(config.lookback_s);
        Self {
            config,
            window_len,
            clock: SampleClock::new(SampleConfig { interval_ms }),
            state: AutotuneState::Off,
            armed: None,
            run: None,
            result: None,
            failure: None,
        }
    }
}

impl RelayAutotuner {
    pub fn new(config: AutotuneConfig) -> ControlResult<Self> {
        config.validate()?;
        let mut tuner = Self::default();
        tuner.config = config;
        tuner.apply_lookback(config.lookback_s);
        Ok(tuner)
    }

    /// Arm a tuning run around `output_start`.
    ///
    /// The step is reduced so both relay levels stay inside the output
    /// limits. The next [`step`](Self::step) captures the baseline.
    pub fn start(&mut self, output_start: f64, out_min: f64, out_max: f64) -> ControlResult<()> {
        if self.is_running() {
            return Err(ControlError::StateError {
                what: "autotune already running",
            });
        }
        if !out_min.is_finite() || !out_max.is_finite() || out_min >= out_max {
            return Err(ControlError::InvalidLimits {
                min: out_min,
                max: out_max,
            });
        }
        if !output_start.is_finite() {
            return Err(ControlError::InvalidArg {
                what: "starting output must be finite",
            });
        }
        self.armed = Some(Arming {
            output_start,
            out_min,
            out_max,
        });
        self.state = AutotuneState::Off;
        self.run = None;
        self.result = None;
        self.failure = None;
        self.clock.reset();
        Ok(())
    }

    /// Drop the run and return to `Off`.
    pub fn cancel(&mut self) {
        if self.is_running() {
            info!("autotune cancelled");
        }
        self.state = AutotuneState::Off;
        self.armed = None;
        self.run = None;
    }

    /// Advance the experiment with a new measurement.
    pub fn step(&mut self, measurement: f64, now: Millis) -> TickResult {
        if self.state.is_terminal() {
            return TickResult::Idle;
        }
        match self.state {
            AutotuneState::Off => {
                let Some(arming) = self.armed.take() else {
                    return TickResult::Idle;
                };
                let step = self.clamped_step(arming).to_f64();
                let run =
                    TuningRun::new(&self.config, self.window_len, arming, step, measurement, now);
                info!(
                    method = %self.config.method,
                    setpoint = measurement,
                    output_start = arming.output_start,
                    step,
                    "autotune started"
                );
                self.state = run.state;
                self.run = Some(run);
            }
            _ => {
                if !self.clock.should_sample(now) {
                    return TickResult::Waiting;
                }
            }
        }
        self.clock.mark(now);

        let Some(run) = self.run.as_mut() else {
            self.state = AutotuneState::Off;
            return TickResult::Idle;
        };
        let outcome = run.advance(measurement, now);
        let output_start = run.levels.clamp(run.levels.start);
        match outcome {
            Advance::Continue => {
                self.state = run.state;
                TickResult::Running { output: run.output }
            }
            Advance::Converged(result) => {
                info!(kp = result.kp, ti = result.ti, td = result.td, "autotune converged");
                self.finish(AutotuneState::Converged);
                self.result = Some(result.clone());
                TickResult::Converged {
                    output: output_start,
                    result,
                }
            }
            Advance::Failed(reason) => {
                info!(%reason, "autotune failed");
                self.finish(AutotuneState::Failed);
                self.failure = Some(reason);
                TickResult::Failed {
                    output: output_start,
                    reason,
                }
            }
        }
    }

    fn finish(&mut self, state: AutotuneState) {
        self.state = state;
        self.run = None;
    }

    fn clamped_step(&self, arming: Arming) -> Step {
        let room_down = Step::saturating_from_f64(arming.output_start - arming.out_min);
        let room_up = Step::saturating_from_f64(arming.out_max - arming.output_start);
        self.config
            .output_step
            .min(room_down)
            .min(room_up)
            .max(Step::ZERO)
    }

    fn apply_lookback(&mut self, lookback_s: u32) {
        let (window_len, interval_ms) = lookback_sampling(lookback_s);
        self.config.lookback_s = lookback_s.max(1);
        self.window_len = window_len;
        self.clock.config = SampleConfig { interval_ms };
    }

    pub fn set_method(&mut self, method: TuningMethod) {
        self.config.method = method;
    }

    pub fn set_output_step(&mut self, step: Step) -> ControlResult<()> {
        if step.is_negative() {
            return Err(ControlError::InvalidArg {
                what: "output step must be non-negative",
            });
        }
        self.config.output_step = step;
        Ok(())
    }

    pub fn set_noise_band(&mut self, band: NoiseBand) -> ControlResult<()> {
        if band.is_negative() {
            return Err(ControlError::InvalidArg {
                what: "noise band must be non-negative",
            });
        }
        self.config.noise_band = band;
        Ok(())
    }

    /// Set the lookback window. Takes effect at the next run.
    pub fn set_lookback_sec(&mut self, lookback_s: u32) {
        self.apply_lookback(lookback_s);
    }

    pub fn set_relay_bias(&mut self, enabled: bool) {
        self.config.relay_bias = enabled;
    }

    pub fn config(&self) -> &AutotuneConfig {
        &self.config
    }

    pub fn method(&self) -> TuningMethod {
        self.config.method
    }

    pub fn output_step(&self) -> Step {
        self.config.output_step
    }

    pub fn noise_band(&self) -> NoiseBand {
        self.config.noise_band
    }

    /// Effective lookback: window length times sample interval.
    pub fn lookback_sec(&self) -> u32 {
        (self.window_len as Millis * self.clock.interval_ms() / 1000) as u32
    }

    pub fn sample_interval_ms(&self) -> Millis {
        self.clock.interval_ms()
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn state(&self) -> AutotuneState {
        self.state
    }

    /// Armed or mid-experiment.
    pub fn is_running(&self) -> bool {
        self.armed.is_some() || self.run.is_some()
    }

    /// Gains from the last converged run.
    pub fn result(&self) -> Option<&AutotuneResult> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<TuneFailure> {
        self.failure
    }

    /// Current relay bias, when relay-bias correction is active.
    pub fn relay_bias(&self) -> Option<f64> {
        let run = self.run.as_ref()?;
        run.steps.as_ref().map(|_| run.levels.bias)
    }

    /// Relay step after limit clamping and bias adjustment.
    pub fn working_step(&self) -> Option<f64> {
        self.run.as_ref().map(|run| run.levels.step)
    }

    /// Relay steps completed since the run started or the relay bias last
    /// changed, when relay-bias correction is active.
    pub fn relay_step_count(&self) -> Option<u32> {
        self.run.as_ref()?.steps.as_ref().map(StepHistory::count)
    }

    pub fn peak_count(&self) -> u32 {
        self.run.as_ref().map_or(0, |run| run.peaks.count())
    }

    /// Noise band in use by the current run.
    pub fn working_noise_band(&self) -> Option<f64> {
        self.run.as_ref().map(|run| run.noise_band)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_predicates() {
        use AutotuneState::*;
        assert!(SteadyStateAtBaseline.is_steady_phase());
        assert!(SteadyStateAfterStepUp.is_steady_phase());
        assert!(!RelayStepUp.is_steady_phase());

        assert!(SteadyStateAfterStepUp.is_step_up_like());
        assert!(RelayStepUp.is_step_up_like());
        assert!(!SteadyStateAtBaseline.is_step_up_like());
        assert!(!RelayStepDown.is_step_up_like());

        assert!(Converged.is_terminal() && Failed.is_terminal());
        assert!(!Off.is_terminal());
    }

    #[test]
    fn lookback_mapping() {
        assert_eq!(lookback_sampling(0), (4, 250));
        assert_eq!(lookback_sampling(10), (40, 250));
        assert_eq!(lookback_sampling(24), (96, 250));
        assert_eq!(lookback_sampling(25), (100, 250));
        assert_eq!(lookback_sampling(60), (100, 600));

        let mut tuner = RelayAutotuner::default();
        assert_eq!(tuner.lookback_sec(), 10);
        tuner.set_lookback_sec(60);
        assert_eq!(tuner.lookback_sec(), 60);
        assert_eq!(tuner.sample_interval_ms(), 600);
        tuner.set_lookback_sec(0);
        assert_eq!(tuner.lookback_sec(), 1);
    }

    #[test]
    fn defaults() {
        let tuner = RelayAutotuner::default();
        assert_eq!(tuner.method(), TuningMethod::ZieglerNicholsPid);
        assert_eq!(tuner.output_step().to_string(), "10.0");
        assert_eq!(tuner.noise_band().to_string(), "0.500");
        assert_eq!(tuner.state(), AutotuneState::Off);
        assert!(!tuner.is_running());
    }

    #[test]
    fn rejected_settings_leave_config() {
        let mut tuner = RelayAutotuner::default();
        assert!(tuner.set_output_step(Step::from_mantissa(-1)).is_err());
        assert!(tuner.set_noise_band(NoiseBand::from_mantissa(-1)).is_err());
        assert_eq!(tuner.config(), &AutotuneConfig::default());

        let bad = AutotuneConfig {
            output_step: Step::from_mantissa(-5),
            ..AutotuneConfig::default()
        };
        assert!(RelayAutotuner::new(bad).is_err());
    }

    #[test]
    fn idle_until_started() {
        let mut tuner = RelayAutotuner::default();
        assert_eq!(tuner.step(20.0, 0), TickResult::Idle);
        assert!(tuner.start(50.0, 10.0, 10.0).is_err());
        assert!(!tuner.is_running());
    }

    #[test]
    fn first_step_drives_high_relay_level() {
        let mut tuner = RelayAutotuner::default();
        tuner.start(50.0, 0.0, 100.0).unwrap();
        assert!(tuner.start(50.0, 0.0, 100.0).is_err());

        assert_eq!(tuner.step(20.0, 0), TickResult::Running { output: 60.0 });
        assert_eq!(tuner.state(), AutotuneState::RelayStepUp);
        assert_eq!(tuner.step(20.0, 100), TickResult::Waiting);

        // Above setpoint + noise band flips the relay
        assert_eq!(tuner.step(20.6, 250), TickResult::Running { output: 40.0 });
        assert_eq!(tuner.state(), AutotuneState::RelayStepDown);
        // Inside the band holds the relay
        assert_eq!(tuner.step(19.6, 500), TickResult::Running { output: 40.0 });
        assert_eq!(tuner.step(19.4, 750), TickResult::Running { output: 60.0 });
    }

    #[test]
    fn step_shrinks_to_fit_limits() {
        let mut tuner = RelayAutotuner::default();
        tuner.start(95.0, 0.0, 100.0).unwrap();
        assert_eq!(tuner.step(20.0, 0), TickResult::Running { output: 100.0 });
        assert_eq!(tuner.working_step(), Some(5.0));
    }

    #[test]
    fn cancel_returns_to_off() {
        let mut tuner = RelayAutotuner::default();
        tuner.start(50.0, 0.0, 100.0).unwrap();
        tuner.step(20.0, 0);
        tuner.cancel();
        assert_eq!(tuner.state(), AutotuneState::Off);
        assert!(!tuner.is_running());
        assert_eq!(tuner.step(20.0, 250), TickResult::Idle);
        assert!(tuner.result().is_none());
    }

    #[test]
    fn adaptive_method_starts_at_baseline() {
        let config = AutotuneConfig {
            method: TuningMethod::AmigofPi,
            ..AutotuneConfig::default()
        };
        let mut tuner = RelayAutotuner::new(config).unwrap();
        tuner.start(30.0, 0.0, 100.0).unwrap();
        assert_eq!(tuner.step(20.0, 0), TickResult::Running { output: 30.0 });
        assert_eq!(tuner.state(), AutotuneState::SteadyStateAtBaseline);
    }

    /// Feed a constant measurement for the whole window, then the sequence.
    fn settle(tuner: &mut RelayAutotuner, values: &[f64], mut now: Millis) -> (Millis, TickResult) {
        let mut last = TickResult::Idle;
        for v in values {
            last = tuner.step(*v, now);
            now += tuner.sample_interval_ms();
        }
        (now, last)
    }

    fn amigof_tuner() -> RelayAutotuner {
        let config = AutotuneConfig {
            method: TuningMethod::AmigofPi,
            lookback_s: 1,
            ..AutotuneConfig::default()
        };
        let mut tuner = RelayAutotuner::new(config).unwrap();
        tuner.start(30.0, 0.0, 100.0).unwrap();
        tuner
    }

    #[test]
    fn steady_phases_measure_process_gain() {
        let mut tuner = amigof_tuner();
        // Window of 4 at baseline 20, one more sample to classify
        let (now, last) = settle(&mut tuner, &[20.0; 5], 0);
        assert_eq!(last, TickResult::Running { output: 30.0 });
        assert_eq!(tuner.state(), AutotuneState::SteadyStateAfterStepUp);

        // Window restarts; the process moves up by 10 for a step of 10
        let (now, last) = settle(&mut tuner, &[30.0; 5], now);
        assert_eq!(last, TickResult::Running { output: 40.0 });
        assert_eq!(tuner.state(), AutotuneState::RelayStepDown);

        // Relay cycle begins on the low level
        assert_eq!(tuner.step(30.0, now), TickResult::Running { output: 20.0 });
    }

    #[test]
    fn zero_process_gain_fails() {
        let mut tuner = amigof_tuner();
        let (now, _) = settle(&mut tuner, &[20.0; 5], 0);
        let (_, last) = settle(&mut tuner, &[20.0; 5], now);
        assert_eq!(
            last,
            TickResult::Failed {
                output: 30.0,
                reason: TuneFailure::ProcessGainNotPositive
            }
        );
        assert_eq!(tuner.state(), AutotuneState::Failed);
        assert_eq!(tuner.failure(), Some(TuneFailure::ProcessGainNotPositive));
        assert!(tuner.result().is_none());
        assert_eq!(tuner.step(20.0, 1_000_000), TickResult::Idle);
    }

    #[test]
    fn relay_bias_reported_only_when_enabled() {
        let mut tuner = RelayAutotuner::default();
        tuner.start(50.0, 0.0, 100.0).unwrap();
        tuner.step(20.0, 0);
        assert_eq!(tuner.relay_bias(), None);

        tuner.cancel();
        tuner.set_relay_bias(true);
        tuner.start(50.0, 0.0, 100.0).unwrap();
        tuner.step(20.0, 0);
        assert_eq!(tuner.relay_bias(), Some(0.0));
    }
}
