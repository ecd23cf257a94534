//! Control-loop supervisor.
//!
//! Owns the PID controller and the relay autotuner and routes every tick to
//! whichever one currently drives the output. While a tuning run is active
//! the controller sits in Manual; afterwards the remembered mode and manual
//! output are restored, and on convergence the new gains are committed.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tt_controls::{
    AutotuneResult, Direction, Mode, PidController, RelayAutotuner, TickResult, TuneFailure,
};
use tt_core::{Gain, Millis, Setpoint, Step};

use crate::error::{AppError, AppResult};
use crate::settings::{ControllerSettings, GainSettings, LATEST_VERSION};

/// Gains written back into the controller after a converged run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommittedGains {
    pub kp: Gain,
    pub ki: Gain,
    pub kd: Gain,
    pub direction: Direction,
}

impl CommittedGains {
    /// Convert a tuning result to controller gains.
    ///
    /// A negative `kp` means the process responds inversely: all three gains
    /// are negated and the direction flipped. Returns `None` when a gain is
    /// not representable as a non-negative [`Gain`].
    pub fn from_result(result: &AutotuneResult, direction: Direction) -> Option<Self> {
        let kp = Gain::try_from(result.kp).ok()?;
        let ki = Gain::try_from(result.ki()).ok()?;
        let kd = Gain::try_from(result.kd()).ok()?;
        let (kp, ki, kd, direction) = if kp.is_negative() {
            (-kp, -ki, -kd, direction.flipped())
        } else {
            (kp, ki, kd, direction)
        };
        if kp.is_negative() || ki.is_negative() || kd.is_negative() {
            return None;
        }
        Some(Self {
            kp,
            ki,
            kd,
            direction,
        })
    }
}

/// Terminal outcome of a tuning run, as seen by the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum TuneEvent {
    Converged {
        result: AutotuneResult,
        gains: CommittedGains,
    },
    /// Converged, but the gains could not be applied.
    Rejected { result: AutotuneResult },
    Failed { reason: TuneFailure },
}

/// Output of one supervisor tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorTick {
    pub output: f64,
    pub event: Option<TuneEvent>,
}

/// Loop state remembered for the duration of a tuning run.
#[derive(Debug, Clone, Copy)]
struct Remembered {
    mode: Mode,
    manual_output: Step,
}

#[derive(Debug, Clone)]
pub struct Supervisor {
    pid: PidController,
    tuner: RelayAutotuner,
    /// Requested loop mode; applied to the controller on the next tick.
    mode: Mode,
    setpoint: Setpoint,
    manual_output: Step,
    output: f64,
    remembered: Option<Remembered>,
}

impl Supervisor {
    pub fn new(pid: PidController, tuner: RelayAutotuner) -> Self {
        let output = pid.output();
        Self {
            pid,
            tuner,
            mode: Mode::Manual,
            setpoint: Setpoint::ZERO,
            manual_output: Step::ZERO,
            output,
            remembered: None,
        }
    }

    pub fn from_settings(settings: &ControllerSettings) -> AppResult<Self> {
        let mut pid = PidController::new(
            settings.direction,
            settings.output_min,
            settings.output_max,
            settings.sample_time_ms,
        )?;
        let GainSettings { kp, ki, kd } = settings.gains;
        pid.set_tunings(kp, ki, kd)?;
        let tuner = RelayAutotuner::new(settings.autotune)?;

        let mut supervisor = Self::new(pid, tuner);
        supervisor.set_manual_output(settings.manual_output)?;
        supervisor.output = supervisor.manual_output.to_f64();
        supervisor.mode = settings.mode;
        supervisor.setpoint = settings.setpoint;
        Ok(supervisor)
    }

    /// Snapshot of the current configuration. The plant block is left empty.
    pub fn settings(&self) -> ControllerSettings {
        let (output_min, output_max) = self.pid.output_limits();
        let remembered = self.remembered.unwrap_or(Remembered {
            mode: self.mode,
            manual_output: self.manual_output,
        });
        ControllerSettings {
            version: LATEST_VERSION,
            gains: GainSettings {
                kp: self.pid.kp(),
                ki: self.pid.ki(),
                kd: self.pid.kd(),
            },
            direction: self.pid.direction(),
            mode: remembered.mode,
            sample_time_ms: self.pid.sample_interval_ms(),
            output_min,
            output_max,
            setpoint: self.setpoint,
            manual_output: remembered.manual_output,
            autotune: *self.tuner.config(),
            plant: None,
        }
    }

    /// Arm a tuning run around the current output.
    ///
    /// # Errors
    ///
    /// Fails if a run is already in progress.
    pub fn start_autotune(&mut self) -> AppResult<()> {
        let (out_min, out_max) = self.pid.output_limits();
        self.tuner.start(self.output, out_min, out_max)?;
        self.remembered = Some(Remembered {
            mode: self.mode,
            manual_output: self.manual_output,
        });
        self.pid.set_mode(Mode::Manual, 0.0, self.output);
        info!(output = self.output, method = %self.tuner.method(), "autotune armed");
        Ok(())
    }

    /// Abandon the tuning run and restore the loop. Returns false when no
    /// run was active.
    pub fn cancel_autotune(&mut self) -> bool {
        if !self.tuner.is_running() {
            return false;
        }
        self.tuner.cancel();
        self.restore();
        true
    }

    /// Advance one tick with the current measurement.
    pub fn tick(&mut self, measurement: f64, now: Millis) -> SupervisorTick {
        if self.tuner.is_running() {
            let tick = self.tuner.step(measurement, now);
            if let Some(output) = tick.output() {
                self.output = output;
            }
            let event = match tick {
                TickResult::Converged { result, .. } => Some(self.commit(result)),
                TickResult::Failed { reason, .. } => {
                    self.restore();
                    Some(TuneEvent::Failed { reason })
                }
                _ => None,
            };
            return SupervisorTick {
                output: self.output,
                event,
            };
        }

        if self.pid.mode() != self.mode {
            self.pid.set_mode(self.mode, measurement, self.output);
        }
        match self.mode {
            Mode::Automatic => {
                if let Some(output) = self.pid.compute(measurement, self.setpoint.to_f64(), now) {
                    self.output = output;
                }
            }
            Mode::Manual => self.output = self.manual_output.to_f64(),
        }
        SupervisorTick {
            output: self.output,
            event: None,
        }
    }

    fn commit(&mut self, result: AutotuneResult) -> TuneEvent {
        let event = match CommittedGains::from_result(&result, self.pid.direction()) {
            Some(gains) => {
                self.pid.set_controller_direction(gains.direction);
                match self.pid.set_tunings(gains.kp, gains.ki, gains.kd) {
                    Ok(()) => {
                        info!(
                            kp = %gains.kp,
                            ki = %gains.ki,
                            kd = %gains.kd,
                            direction = ?gains.direction,
                            "tuned gains committed"
                        );
                        TuneEvent::Converged { result, gains }
                    }
                    Err(err) => {
                        warn!(%err, "tuned gains rejected");
                        TuneEvent::Rejected { result }
                    }
                }
            }
            None => {
                warn!(kp = result.kp, ti = result.ti, td = result.td, "tuned gains not representable");
                TuneEvent::Rejected { result }
            }
        };
        self.restore();
        event
    }

    fn restore(&mut self) {
        if let Some(remembered) = self.remembered.take() {
            self.mode = remembered.mode;
            self.manual_output = remembered.manual_output;
        }
        if self.mode == Mode::Manual {
            self.output = self.manual_output.to_f64();
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        match self.remembered.as_mut() {
            Some(remembered) => remembered.mode = mode,
            None => self.mode = mode,
        }
    }

    pub fn set_setpoint(&mut self, setpoint: Setpoint) {
        self.setpoint = setpoint;
    }

    /// Set the Manual-mode output. Must lie within the output limits.
    pub fn set_manual_output(&mut self, output: Step) -> AppResult<()> {
        let (min, max) = self.pid.output_limits();
        let value = output.to_f64();
        if value < min || value > max {
            return Err(AppError::InvalidInput(format!(
                "manual output {output} outside {min}..{max}"
            )));
        }
        match self.remembered.as_mut() {
            Some(remembered) => remembered.manual_output = output,
            None => self.manual_output = output,
        }
        Ok(())
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    pub fn tuner(&self) -> &RelayAutotuner {
        &self.tuner
    }

    /// Autotuner settings take effect at the next run.
    pub fn tuner_mut(&mut self) -> &mut RelayAutotuner {
        &mut self.tuner
    }

    pub fn is_tuning(&self) -> bool {
        self.tuner.is_running()
    }

    pub fn mode(&self) -> Mode {
        self.remembered.map_or(self.mode, |r| r.mode)
    }

    pub fn setpoint(&self) -> Setpoint {
        self.setpoint
    }

    pub fn manual_output(&self) -> Step {
        self.remembered
            .map_or(self.manual_output, |r| r.manual_output)
    }

    /// Output applied on the last tick.
    pub fn output(&self) -> f64 {
        self.output
    }
}
