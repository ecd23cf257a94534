//! Integration tests for simulated sessions and their progress events.

use tt_app::{
    AppError, ControllerSettings, MAX_SESSION_TICKS, SessionOptions, SessionProgressEvent,
    SessionStage, TuneOutcome, run_session, run_session_with_progress,
};
use tt_controls::Mode;
use tt_core::{Setpoint, Step};
use tt_sim::ProcessParams;

fn heater() -> ProcessParams {
    ProcessParams {
        gain: 2.0,
        time_constant_s: 30.0,
        dead_time_s: 5.0,
        baseline_output: 50.0,
        baseline_value: 100.0,
        dt_s: 0.25,
    }
}

fn settings() -> ControllerSettings {
    ControllerSettings {
        mode: Mode::Automatic,
        setpoint: Setpoint::from_mantissa(1_050),
        manual_output: Step::from_mantissa(500),
        ..ControllerSettings::default()
    }
}

#[test]
fn autotune_then_closed_loop_reaches_setpoint() {
    let options = SessionOptions {
        duration_s: 1500.0,
        autotune: true,
        record_every: 4,
    };
    let mut events: Vec<SessionProgressEvent> = Vec::new();
    let report = run_session_with_progress(
        &settings(),
        &heater(),
        &options,
        Some(&mut |event| events.push(event)),
    )
    .expect("session should run");

    let Some(TuneOutcome::Converged { gains, time_s, .. }) = &report.tune else {
        panic!("expected converged autotune, got {:?}", report.tune);
    };
    assert!(*time_s < 300.0, "tuning took {time_s} s");
    assert_eq!(report.settings.gains.kp, gains.kp);
    assert_eq!(report.settings.plant, Some(heater()));
    assert_eq!(report.settings.mode, Mode::Automatic);

    assert_eq!(report.ticks, 6_000);
    assert_eq!(report.records.len(), 1_500);
    assert!(report.records[0].tuning);
    assert!(!report.records.last().unwrap().tuning);
    assert!(
        (report.final_measurement - 105.0).abs() < 0.5,
        "final measurement {}",
        report.final_measurement
    );

    let stages: Vec<SessionStage> = events.iter().map(|e| e.stage).collect();
    assert_eq!(stages.first(), Some(&SessionStage::Starting));
    assert_eq!(stages.last(), Some(&SessionStage::Completed));
    assert!(stages.contains(&SessionStage::Autotuning));
    assert!(stages.contains(&SessionStage::ClosedLoop));
    assert!(
        events
            .iter()
            .filter(|e| e.stage == SessionStage::Autotuning)
            .all(|e| e.autotune.is_some())
    );
    assert!(
        events
            .iter()
            .any(|e| e.message.as_deref().is_some_and(|m| m.starts_with("autotune converged")))
    );
    assert!(
        events
            .windows(2)
            .all(|w| w[0].fraction_complete <= w[1].fraction_complete)
    );
}

#[test]
fn session_without_autotune_has_no_outcome() {
    let options = SessionOptions {
        duration_s: 10.0,
        autotune: false,
        record_every: 1,
    };
    let report = run_session(&settings(), &heater(), &options).unwrap();
    assert!(report.tune.is_none());
    assert_eq!(report.records.len(), 40);
    assert!(report.records.iter().all(|r| !r.tuning));

    let json = report.to_json().unwrap();
    assert!(json.contains("\"records\""));
}

#[test]
fn rejects_bad_options() {
    let options = SessionOptions {
        duration_s: 0.0,
        ..SessionOptions::default()
    };
    assert!(matches!(
        run_session(&settings(), &heater(), &options),
        Err(AppError::InvalidInput(_))
    ));

    let fast_plant = ProcessParams {
        dt_s: 1e-4,
        ..heater()
    };
    assert!(matches!(
        run_session(&settings(), &fast_plant, &SessionOptions::default()),
        Err(AppError::InvalidInput(_))
    ));

    // Finite but far too long to simulate
    for duration_s in [1e300, MAX_SESSION_TICKS as f64 * 0.25 + 1.0] {
        let options = SessionOptions {
            duration_s,
            ..SessionOptions::default()
        };
        assert!(matches!(
            run_session(&settings(), &heater(), &options),
            Err(AppError::InvalidInput(_))
        ));
    }
}
