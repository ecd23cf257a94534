use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::Level;
use tt_app::{
    AppError, AppResult, ControllerSettings, SessionOptions, SessionProgressEvent, SessionReport,
    SessionStage, TuneOutcome, load_settings, run_session_with_progress, save_settings,
};
use tt_controls::{TuningMethod, TuningRuleTable};
use tt_sim::ProcessParams;

#[derive(Parser)]
#[command(name = "tt-cli")]
#[command(about = "thermotune CLI - PID control and relay autotuning on a simulated process", long_about = None)]
struct Cli {
    /// Log controller and autotuner transitions
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a settings file
    Validate {
        /// Path to the settings YAML file
        settings_path: PathBuf,
    },
    /// Run an autotune against the simulated process
    Autotune {
        /// Path to the settings YAML file
        settings_path: PathBuf,
        /// Write the tuned settings back to the file
        #[arg(long)]
        save: bool,
        /// Give up after this many simulated seconds
        #[arg(long, default_value_t = 1800.0)]
        max_duration_s: f64,
    },
    /// Run the control loop against the simulated process
    Run {
        /// Path to the settings YAML file
        settings_path: PathBuf,
        /// Simulated duration in seconds
        #[arg(long, default_value_t = 1800.0)]
        duration_s: f64,
        /// Print the full session report as JSON
        #[arg(long)]
        json: bool,
        /// Start closed loop with the configured gains
        #[arg(long)]
        no_autotune: bool,
        /// Keep every n-th tick in the trace
        #[arg(long, default_value_t = 4)]
        record_every: usize,
    },
    /// List tuning rules, or resolve gains from an ultimate gain and period
    Rules {
        /// Ultimate gain
        #[arg(long, requires = "pu")]
        ku: Option<f64>,
        /// Ultimate period in seconds
        #[arg(long, requires = "ku")]
        pu: Option<f64>,
    },
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays clean
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Validate { settings_path } => cmd_validate(&settings_path),
        Commands::Autotune {
            settings_path,
            save,
            max_duration_s,
        } => cmd_autotune(&settings_path, save, max_duration_s),
        Commands::Run {
            settings_path,
            duration_s,
            json,
            no_autotune,
            record_every,
        } => cmd_run(
            &settings_path,
            &SessionOptions {
                duration_s,
                autotune: !no_autotune,
                record_every,
            },
            json,
        ),
        Commands::Rules { ku, pu } => cmd_rules(ku.zip(pu)),
    }
}

fn plant_for(settings: &ControllerSettings) -> ProcessParams {
    settings.plant.unwrap_or_default()
}

fn cmd_validate(settings_path: &Path) -> AppResult<()> {
    println!("Validating settings: {}", settings_path.display());
    let settings = load_settings(settings_path)?;
    println!("✓ Settings are valid");
    println!(
        "  Gains: Kp={} Ki={} Kd={} ({:?})",
        settings.gains.kp, settings.gains.ki, settings.gains.kd, settings.direction
    );
    println!("  Autotune method: {}", settings.autotune.method);
    if settings.plant.is_none() {
        println!("  No plant section, sessions use the default process");
    }
    Ok(())
}

fn cmd_autotune(settings_path: &Path, save: bool, max_duration_s: f64) -> AppResult<()> {
    let settings = load_settings(settings_path)?;
    let plant = plant_for(&settings);
    println!(
        "Autotuning with {} (step {}, noise band {})",
        settings.autotune.method, settings.autotune.output_step, settings.autotune.noise_band
    );

    let options = SessionOptions {
        duration_s: max_duration_s,
        autotune: true,
        record_every: usize::MAX,
    };
    let report = run_with_progress(&settings, &plant, &options)?;

    match &report.tune {
        Some(TuneOutcome::Converged {
            result,
            gains,
            time_s,
        }) => {
            println!("✓ Converged after {:.1} s", time_s);
            println!("  Ku = {:.4}", result.ultimate_gain);
            println!("  Pu = {:.3} s", result.ultimate_period_s);
            println!("  Amplitude = {:.4}", result.induced_amplitude);
            if let Some(gain) = result.process_gain {
                println!("  Process gain = {:.4}", gain);
            }
            if let Some(lag) = result.phase_lag {
                println!("  Phase lag = {:.1}°", lag.to_degrees());
            }
            println!(
                "  Gains: Kp={} Ki={} Kd={} ({:?})",
                gains.kp, gains.ki, gains.kd, gains.direction
            );
        }
        Some(TuneOutcome::Rejected { result, time_s }) => {
            println!(
                "✗ Gains rejected after {:.1} s (Kp={:.4}, Ti={:.3}, Td={:.3})",
                time_s, result.kp, result.ti, result.td
            );
            return Ok(());
        }
        Some(TuneOutcome::Failed { reason, time_s }) => {
            println!("✗ Autotune failed after {:.1} s: {}", time_s, reason);
            return Ok(());
        }
        Some(TuneOutcome::Unfinished) | None => {
            println!("✗ Autotune still running after {:.1} s", max_duration_s);
            return Ok(());
        }
    }

    if save {
        let mut updated = report.settings.clone();
        updated.plant = settings.plant;
        save_settings(settings_path, &updated)?;
        println!("✓ Saved tuned settings to {}", settings_path.display());
    }
    Ok(())
}

fn cmd_run(settings_path: &Path, options: &SessionOptions, json: bool) -> AppResult<()> {
    let settings = load_settings(settings_path)?;
    let plant = plant_for(&settings);

    let report = if json {
        tt_app::run_session(&settings, &plant, options)?
    } else {
        println!(
            "Running {:.0} s session (dt = {:.3} s, setpoint = {})",
            options.duration_s, plant.dt_s, settings.setpoint
        );
        run_with_progress(&settings, &plant, options)?
    };

    if json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    print_tune_summary(&report);
    println!("  Ticks: {}", report.ticks);
    println!("  Records: {}", report.records.len());
    println!("  Final measurement: {:.3}", report.final_measurement);
    println!(
        "  Final gains: Kp={} Ki={} Kd={}",
        report.settings.gains.kp, report.settings.gains.ki, report.settings.gains.kd
    );
    Ok(())
}

fn cmd_rules(ku_pu: Option<(f64, f64)>) -> AppResult<()> {
    if let Some((ku, pu)) = ku_pu {
        if !(ku > 0.0 && pu > 0.0 && ku.is_finite() && pu.is_finite()) {
            return Err(AppError::InvalidInput(format!(
                "Ku and Pu must be positive, got {} and {}",
                ku, pu
            )));
        }
    }

    println!("Tuning rules:");
    for method in TuningMethod::ALL {
        let Some(rule) = TuningRuleTable::lookup(method) else {
            println!(
                "  {:>2}  {:<20}  adaptive (step test and phase lag)",
                method.index(),
                method.name()
            );
            continue;
        };

        let td = if rule.is_pi_only() {
            "-".to_string()
        } else {
            format!("Pu/{:.2}", rule.td_divisor())
        };
        let mut line = format!(
            "  {:>2}  {:<20}  Kp=Ku/{:<5.2} Ti=Pu/{:<5.2} Td={:<8}",
            method.index(),
            method.name(),
            rule.kp_divisor(),
            rule.ti_divisor(),
            td
        );
        if let Some((ku, pu)) = ku_pu {
            let gains = rule.apply(ku, pu);
            line.push_str(&format!(
                "  Kp={:.4} Ki={:.4} Kd={:.4}",
                gains.kp,
                gains.ki(),
                gains.kd()
            ));
        }
        println!("{}", line);
    }
    Ok(())
}

fn run_with_progress(
    settings: &ControllerSettings,
    plant: &ProcessParams,
    options: &SessionOptions,
) -> AppResult<SessionReport> {
    let started = Instant::now();
    let mut last_emit = Instant::now();
    let mut last_stage = None;
    let report = run_session_with_progress(
        settings,
        plant,
        options,
        Some(&mut |event| {
            let emit_now = last_stage != Some(event.stage)
                || event.message.is_some()
                || last_emit.elapsed().as_millis() >= 100;
            if emit_now {
                render_cli_progress(&event, started.elapsed().as_secs_f64());
                last_stage = Some(event.stage);
                last_emit = Instant::now();
            }
        }),
    )?;
    clear_progress_line();
    Ok(report)
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(120));
    let _ = io::stdout().flush();
}

fn render_cli_progress(event: &SessionProgressEvent, elapsed_wall_s: f64) {
    let width = 28usize;
    let filled = ((event.fraction_complete * width as f64).round() as usize).min(width);
    let bar = format!(
        "{}{}",
        "#".repeat(filled),
        "-".repeat(width.saturating_sub(filled))
    );
    let mut line = format!(
        "\r[{}] {:>6.2}%  {}  t={:.1}/{:.1}s  elapsed={:.2}s",
        bar,
        event.fraction_complete * 100.0,
        stage_label(event.stage),
        event.sim_time_s,
        event.t_end_s,
        elapsed_wall_s
    );
    if let Some(tune) = &event.autotune {
        line.push_str(&format!("  state={:?}  peaks={}", tune.state, tune.peak_count));
        if let Some(band) = tune.noise_band {
            line.push_str(&format!("  band={:.3}", band));
        }
    }
    if let Some(msg) = &event.message {
        // Messages mark milestones, keep them on their own line
        clear_progress_line();
        println!("{}", msg);
    }
    print!("{}", line);
    let _ = io::stdout().flush();
}

fn stage_label(stage: SessionStage) -> &'static str {
    match stage {
        SessionStage::Starting => "starting",
        SessionStage::Autotuning => "autotuning",
        SessionStage::ClosedLoop => "closed loop",
        SessionStage::Completed => "completed",
    }
}

fn print_tune_summary(report: &SessionReport) {
    match &report.tune {
        None => println!("✓ Session completed (no autotune)"),
        Some(TuneOutcome::Converged { gains, time_s, .. }) => println!(
            "✓ Session completed, autotune converged at {:.1} s (Kp={} Ki={} Kd={})",
            time_s, gains.kp, gains.ki, gains.kd
        ),
        Some(TuneOutcome::Rejected { time_s, .. }) => println!(
            "✓ Session completed, autotune gains rejected at {:.1} s",
            time_s
        ),
        Some(TuneOutcome::Failed { reason, time_s }) => println!(
            "✓ Session completed, autotune failed at {:.1} s: {}",
            time_s, reason
        ),
        Some(TuneOutcome::Unfinished) => {
            println!("✓ Session completed, autotune still running at the end")
        }
    }
}
