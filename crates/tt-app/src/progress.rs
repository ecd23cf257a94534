//! Progress events streamed from a simulated session.

use serde::Serialize;
use tt_controls::AutotuneState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    Starting,
    Autotuning,
    ClosedLoop,
    Completed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AutotuneProgress {
    pub state: AutotuneState,
    pub peak_count: u32,
    /// Noise band in use, which the adaptive method may widen.
    pub noise_band: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionProgressEvent {
    pub stage: SessionStage,
    pub sim_time_s: f64,
    pub t_end_s: f64,
    pub fraction_complete: f64,
    pub message: Option<String>,
    pub autotune: Option<AutotuneProgress>,
}

impl SessionProgressEvent {
    pub fn stage(stage: SessionStage, sim_time_s: f64, t_end_s: f64, message: Option<String>) -> Self {
        let fraction_complete = if t_end_s > 0.0 {
            (sim_time_s / t_end_s).clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self {
            stage,
            sim_time_s,
            t_end_s,
            fraction_complete,
            message,
            autotune: None,
        }
    }
}
