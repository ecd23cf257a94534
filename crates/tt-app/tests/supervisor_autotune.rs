//! Integration tests: supervisor running autotune against a simulated heater.

use tt_app::{CommittedGains, ControllerSettings, GainSettings, Supervisor, TuneEvent};
use tt_controls::{Direction, Mode, TuneFailure};
use tt_core::{Gain, Millis, Setpoint, Step};
use tt_sim::{FirstOrderProcess, ProcessParams};

const TICK_MS: Millis = 250;

fn heater(baseline_output: f64) -> FirstOrderProcess {
    FirstOrderProcess::new(ProcessParams {
        gain: 2.0,
        time_constant_s: 30.0,
        dead_time_s: 5.0,
        baseline_output,
        baseline_value: 100.0,
        dt_s: 0.25,
    })
    .expect("valid plant")
}

fn settings(mode: Mode, manual_output: Step) -> ControllerSettings {
    ControllerSettings {
        mode,
        manual_output,
        setpoint: Setpoint::from_mantissa(1_000),
        gains: GainSettings {
            kp: Gain::from_mantissa(500),
            ki: Gain::from_mantissa(10),
            kd: Gain::ZERO,
        },
        ..ControllerSettings::default()
    }
}

/// Tick until the tuning run ends. Returns the event and the tick index.
fn run_until_event(
    sup: &mut Supervisor,
    process: &mut FirstOrderProcess,
    max_ticks: u64,
) -> (TuneEvent, u64) {
    for i in 0..max_ticks {
        let tick = sup.tick(process.value(), i * TICK_MS);
        if let Some(event) = tick.event {
            return (event, i);
        }
        process.step(tick.output);
    }
    panic!("tuning did not finish in {max_ticks} ticks");
}

#[test]
fn converged_run_commits_gains_and_restores_mode() {
    let mut sup = Supervisor::from_settings(&settings(Mode::Automatic, Step::from_mantissa(500))).unwrap();
    let mut process = heater(50.0);
    sup.start_autotune().unwrap();

    let (event, last) = run_until_event(&mut sup, &mut process, 20_000);
    let TuneEvent::Converged { result, gains } = event else {
        panic!("expected convergence, got {event:?}");
    };
    assert_eq!(
        Some(gains),
        CommittedGains::from_result(&result, Direction::Direct)
    );
    assert_eq!(gains.direction, Direction::Direct);
    assert_eq!(sup.pid().kp(), gains.kp);
    assert_eq!(sup.pid().ki(), gains.ki);
    assert_eq!(sup.pid().kd(), gains.kd);
    assert!(gains.kd > Gain::ZERO);
    assert!(!sup.is_tuning());
    assert_eq!(sup.output(), 50.0);

    // Automatic again on the next tick, continuing from the starting output
    process.step(sup.output());
    let next = sup.tick(process.value(), (last + 1) * TICK_MS);
    assert_eq!(sup.mode(), Mode::Automatic);
    assert_eq!(sup.pid().mode(), Mode::Automatic);
    assert!((0.0..=100.0).contains(&next.output));
    assert_eq!(sup.settings().gains.kp, gains.kp);
}

#[test]
fn stalled_run_leaves_gains_and_manual_output() {
    // Output at the upper limit: the relay has no room to move
    let mut sup = Supervisor::from_settings(&settings(Mode::Manual, Step::from_mantissa(1_000))).unwrap();
    let mut process = heater(100.0);
    sup.start_autotune().unwrap();

    let (event, _) = run_until_event(&mut sup, &mut process, 5_000);
    assert_eq!(
        event,
        TuneEvent::Failed {
            reason: TuneFailure::Stalled
        }
    );
    assert_eq!(sup.mode(), Mode::Manual);
    assert_eq!(sup.output(), 100.0);
    assert_eq!(sup.pid().kp(), Gain::from_mantissa(500));
    assert_eq!(sup.pid().ki(), Gain::from_mantissa(10));
    assert!(sup.tuner().result().is_none());
}
