//! Closed-loop sessions against a simulated process.
//!
//! A session drives a [`Supervisor`] against a [`FirstOrderProcess`] on the
//! process sample period, optionally running an autotune first, and keeps a
//! decimated trace of the loop.

use serde::Serialize;
use tracing::{debug, info};
use tt_controls::{AutotuneResult, TuneFailure};
use tt_core::{Millis, ms_to_secs};
use tt_sim::{FirstOrderProcess, ProcessParams};

use crate::error::{AppError, AppResult};
use crate::progress::{AutotuneProgress, SessionProgressEvent, SessionStage};
use crate::settings::{ControllerSettings, validate_settings};
use crate::supervisor::{CommittedGains, Supervisor, TuneEvent};

/// Longest session, in ticks, that a run accepts.
pub const MAX_SESSION_TICKS: u64 = 10_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Simulated duration in seconds.
    pub duration_s: f64,
    /// Start an autotune on the first tick.
    pub autotune: bool,
    /// Keep every n-th tick in the trace.
    pub record_every: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            duration_s: 1800.0,
            autotune: true,
            record_every: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceRecord {
    pub time_s: f64,
    pub measurement: f64,
    pub output: f64,
    pub setpoint: f64,
    pub tuning: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TuneOutcome {
    Converged {
        result: AutotuneResult,
        gains: CommittedGains,
        time_s: f64,
    },
    Rejected {
        result: AutotuneResult,
        time_s: f64,
    },
    Failed {
        reason: TuneFailure,
        time_s: f64,
    },
    /// Still running when the session ended.
    Unfinished,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub ticks: u64,
    pub tune: Option<TuneOutcome>,
    /// Controller settings at the end of the session, plant included.
    pub settings: ControllerSettings,
    pub final_measurement: f64,
    pub records: Vec<TraceRecord>,
}

impl SessionReport {
    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Run a session without progress reporting.
pub fn run_session(
    settings: &ControllerSettings,
    plant: &ProcessParams,
    options: &SessionOptions,
) -> AppResult<SessionReport> {
    run_session_with_progress(settings, plant, options, None)
}

fn emit(progress_cb: &mut Option<&mut dyn FnMut(SessionProgressEvent)>, event: SessionProgressEvent) {
    if let Some(cb) = progress_cb.as_deref_mut() {
        cb(event);
    }
}

/// Run a session and stream progress events.
///
/// Events are emitted at every stage change and about every 5% of the
/// simulated duration.
pub fn run_session_with_progress(
    settings: &ControllerSettings,
    plant: &ProcessParams,
    options: &SessionOptions,
    mut progress_cb: Option<&mut dyn FnMut(SessionProgressEvent)>,
) -> AppResult<SessionReport> {
    validate_settings(settings)?;
    if !(options.duration_s > 0.0) || !options.duration_s.is_finite() {
        return Err(AppError::InvalidInput(format!(
            "session duration must be positive, got {}",
            options.duration_s
        )));
    }
    let tick_ms = (plant.dt_s * 1000.0).round() as Millis;
    if tick_ms == 0 {
        return Err(AppError::InvalidInput(format!(
            "plant sample period {} s is below one millisecond",
            plant.dt_s
        )));
    }

    let t_end_s = options.duration_s;
    let ticks = (t_end_s * 1000.0 / tick_ms as f64).ceil();
    if ticks > MAX_SESSION_TICKS as f64 {
        return Err(AppError::InvalidInput(format!(
            "session of {t_end_s} s needs more than {MAX_SESSION_TICKS} ticks of {tick_ms} ms"
        )));
    }
    let total_ticks = ticks as u64;

    let mut process = FirstOrderProcess::new(*plant)?;
    let mut supervisor = Supervisor::from_settings(settings)?;
    let record_every = options.record_every.max(1) as u64;

    emit(
        &mut progress_cb,
        SessionProgressEvent::stage(SessionStage::Starting, 0.0, t_end_s, None),
    );
    info!(t_end_s, tick_ms, autotune = options.autotune, "session started");

    if options.autotune {
        supervisor.start_autotune()?;
    }

    let mut stage = SessionStage::Starting;
    let mut tune = options.autotune.then_some(TuneOutcome::Unfinished);
    let mut records = Vec::new();
    let report_every = (total_ticks / 20).max(1);

    for tick_index in 0..total_ticks {
        let now = tick_index * tick_ms;
        let time_s = ms_to_secs(now);
        let measurement = process.value();
        let tick = supervisor.tick(measurement, now);

        let current = if supervisor.is_tuning() {
            SessionStage::Autotuning
        } else {
            SessionStage::ClosedLoop
        };
        let mut message = None;

        if let Some(event) = tick.event {
            let outcome = match event {
                TuneEvent::Converged { result, gains } => {
                    message = Some(format!(
                        "autotune converged: Kp={} Ki={} Kd={}",
                        gains.kp, gains.ki, gains.kd
                    ));
                    TuneOutcome::Converged {
                        result,
                        gains,
                        time_s,
                    }
                }
                TuneEvent::Rejected { result } => {
                    message = Some("autotune gains rejected".to_string());
                    TuneOutcome::Rejected { result, time_s }
                }
                TuneEvent::Failed { reason } => {
                    message = Some(format!("autotune failed: {reason}"));
                    TuneOutcome::Failed { reason, time_s }
                }
            };
            tune = Some(outcome);
        }

        if current != stage || message.is_some() || tick_index % report_every == 0 {
            let mut event = SessionProgressEvent::stage(current, time_s, t_end_s, message);
            if current == SessionStage::Autotuning {
                let tuner = supervisor.tuner();
                event.autotune = Some(AutotuneProgress {
                    state: tuner.state(),
                    peak_count: tuner.peak_count(),
                    noise_band: tuner.working_noise_band(),
                });
            }
            emit(&mut progress_cb, event);
            stage = current;
        }

        if tick_index % record_every == 0 {
            records.push(TraceRecord {
                time_s,
                measurement,
                output: tick.output,
                setpoint: supervisor.setpoint().to_f64(),
                tuning: supervisor.is_tuning(),
            });
        }

        process.step(tick.output);
    }

    let final_measurement = process.value();
    debug!(final_measurement, records = records.len(), "session finished");
    emit(
        &mut progress_cb,
        SessionProgressEvent::stage(SessionStage::Completed, t_end_s, t_end_s, None),
    );

    let mut final_settings = supervisor.settings();
    final_settings.plant = Some(*plant);
    Ok(SessionReport {
        ticks: total_ticks,
        tune,
        settings: final_settings,
        final_measurement,
        records,
    })
}
