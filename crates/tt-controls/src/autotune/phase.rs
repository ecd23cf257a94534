//! Phase-lag estimation and the AMIGOf PI rule.
//!
//! Source: Hägglund & Åström, "Revisiting the Ziegler-Nichols tuning rules
//! for PI control, Part II: the frequency response method", Asian Journal of
//! Control 6(4), 2004.

use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, PI};

use crate::rules::RuleGains;

/// Phase lag the noise band is steered towards.
pub const PHASE_TARGET_RAD: f64 = 130.0 * PI / 180.0;
/// Accepted deviation from [`PHASE_TARGET_RAD`].
pub const PHASE_TOLERANCE_RAD: f64 = 15.0 * PI / 180.0;

/// Rational arctangent approximation, accurate to about 0.3° on `[-1, 1]`.
pub fn fast_atan(x: f64) -> f64 {
    x / (1.0 + 0.28125 * x * x)
}

/// Phase lag of the relay loop from the hysteresis and the induced amplitude.
///
/// The hysteresis is twice the noise band. A hysteresis at least as wide as
/// the amplitude gives the limiting lag of 90°.
pub fn phase_lag(noise_band: f64, amplitude: f64) -> f64 {
    let ratio = 2.0 * noise_band / amplitude;
    if !(ratio < 1.0) {
        return FRAC_PI_2;
    }
    PI - fast_atan(ratio / (1.0 - ratio * ratio).sqrt())
}

pub fn within_target(lag: f64) -> bool {
    (lag - PHASE_TARGET_RAD).abs() <= PHASE_TOLERANCE_RAD
}

/// Noise band aiming at a 135° lag for the observed amplitude.
pub fn rearmed_noise_band(amplitude: f64) -> f64 {
    amplitude * 0.5 * FRAC_1_SQRT_2
}

/// AMIGOf PI gains.
///
/// # Arguments
///
/// * `ku` - Ultimate gain
/// * `pu` - Ultimate period (seconds)
/// * `process_gain` - Static process gain from the step test
/// * `lag` - Phase lag (radians)
pub fn amigof_gains(ku: f64, pu: f64, process_gain: f64, lag: f64) -> RuleGains {
    let kappa = (1.0 / ku) / process_gain;
    let kp = ((2.50 - 0.92 * lag) / (1.0 + (10.75 - 4.01 * lag) * kappa)) * ku;
    let ti_den = 1.0 + (-6.10 + 3.44 * lag) * kappa;
    let ti = ((-3.05 + 1.72 * lag) / (ti_den * ti_den)) * pu;
    RuleGains { kp, ti, td: 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_atan_tracks_atan_on_unit_interval() {
        for i in 0..=20 {
            let x = i as f64 / 20.0;
            assert!((fast_atan(x) - x.atan()).abs() < 0.006, "x = {x}");
        }
    }

    #[test]
    fn wide_hysteresis_gives_right_angle() {
        assert_eq!(phase_lag(1.0, 1.0), FRAC_PI_2);
        assert_eq!(phase_lag(0.5, 1.0), FRAC_PI_2);
        assert_eq!(phase_lag(1.0, 0.0), FRAC_PI_2);
    }

    #[test]
    fn narrow_hysteresis_approaches_pi() {
        let lag = phase_lag(0.001, 10.0);
        assert!((lag - PI).abs() < 1e-3);

        // ratio = 0.5 -> asin(0.5) = 30 deg -> about 150 deg
        let lag = phase_lag(0.25, 1.0);
        assert!((lag.to_degrees() - 150.0).abs() < 1.0);
        assert!(!within_target(lag));
    }

    #[test]
    fn rearmed_band_lands_in_target() {
        let amplitude = 4.0;
        let nb = rearmed_noise_band(amplitude);
        let lag = phase_lag(nb, amplitude);
        assert!(within_target(lag), "lag = {}", lag.to_degrees());
    }

    #[test]
    fn amigof_is_pi_only() {
        let g = amigof_gains(5.0, 60.0, 2.0, PHASE_TARGET_RAD);
        assert_eq!(g.td, 0.0);
        assert!(g.kp.is_finite() && g.ti.is_finite());
        assert!(g.ti > 0.0);
    }
}
