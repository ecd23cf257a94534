//! Tuning rules for relay-feedback autotuning.
//!
//! Each fixed rule turns an ultimate gain `Ku` and ultimate period `Pu` into
//! PID gains through three divisors:
//!
//! ```text
//! Kp = Ku / kp_div
//! Ti = Pu / ti_div
//! Td = Pu / td_div      (0 for PI-only rules)
//! ```
//!
//! Tyreus-Luyben and Ciancone-Marlin divisors follow Yu, *Autotuning of PID
//! Controllers: A Relay Feedback Approach*; Pessen, some-overshoot and
//! no-overshoot follow McCormack & Godfrey (1998). Divisors are stored as
//! bytes in units of 0.05.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Selects how gains are derived at convergence.
///
/// The discriminant is the persisted method index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningMethod {
    ZieglerNicholsPi = 0,
    #[default]
    ZieglerNicholsPid = 1,
    TyreusLuybenPi = 2,
    TyreusLuybenPid = 3,
    CianconeMarlinPi = 4,
    CianconeMarlinPid = 5,
    PessenIntegralPid = 6,
    SomeOvershootPid = 7,
    NoOvershootPid = 8,
    /// Adaptive PI rule from measured phase lag and process gain.
    AmigofPi = 9,
}

impl TuningMethod {
    pub const ALL: [TuningMethod; 10] = [
        TuningMethod::ZieglerNicholsPi,
        TuningMethod::ZieglerNicholsPid,
        TuningMethod::TyreusLuybenPi,
        TuningMethod::TyreusLuybenPid,
        TuningMethod::CianconeMarlinPi,
        TuningMethod::CianconeMarlinPid,
        TuningMethod::PessenIntegralPid,
        TuningMethod::SomeOvershootPid,
        TuningMethod::NoOvershootPid,
        TuningMethod::AmigofPi,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            TuningMethod::ZieglerNicholsPi => "ziegler_nichols_pi",
            TuningMethod::ZieglerNicholsPid => "ziegler_nichols_pid",
            TuningMethod::TyreusLuybenPi => "tyreus_luyben_pi",
            TuningMethod::TyreusLuybenPid => "tyreus_luyben_pid",
            TuningMethod::CianconeMarlinPi => "ciancone_marlin_pi",
            TuningMethod::CianconeMarlinPid => "ciancone_marlin_pid",
            TuningMethod::PessenIntegralPid => "pessen_integral_pid",
            TuningMethod::SomeOvershootPid => "some_overshoot_pid",
            TuningMethod::NoOvershootPid => "no_overshoot_pid",
            TuningMethod::AmigofPi => "amigof_pi",
        }
    }

    /// True for the method that runs the steady-state phases and adapts the
    /// noise band from the measured phase lag.
    pub fn is_adaptive(self) -> bool {
        self == TuningMethod::AmigofPi
    }

    /// True when the method produces no derivative term.
    pub fn is_pi_only(self) -> bool {
        match TuningRuleTable::lookup(self) {
            Some(rule) => rule.is_pi_only(),
            None => true,
        }
    }
}

impl TryFrom<u8> for TuningMethod {
    type Error = ControlError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        TuningMethod::ALL
            .get(index as usize)
            .copied()
            .ok_or_else(|| ControlError::UnknownMethod {
                what: format!("index {index}"),
            })
    }
}

impl FromStr for TuningMethod {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        TuningMethod::ALL
            .into_iter()
            .find(|m| m.name() == wanted)
            .ok_or_else(|| ControlError::UnknownMethod {
                what: s.to_string(),
            })
    }
}

impl fmt::Display for TuningMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Three divisors in units of 0.05; `td_div == 0` marks a PI-only rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuningRule {
    pub kp_div: u8,
    pub ti_div: u8,
    pub td_div: u8,
}

/// Gains resolved from `Ku`/`Pu`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleGains {
    pub kp: f64,
    /// Integral time in seconds.
    pub ti: f64,
    /// Derivative time in seconds.
    pub td: f64,
}

impl RuleGains {
    pub fn ki(&self) -> f64 {
        self.kp / self.ti
    }

    pub fn kd(&self) -> f64 {
        self.kp * self.td
    }
}

const DIVISOR_UNIT: f64 = 0.05;

impl TuningRule {
    pub const fn new(kp_div: u8, ti_div: u8, td_div: u8) -> Self {
        Self {
            kp_div,
            ti_div,
            td_div,
        }
    }

    pub fn is_pi_only(&self) -> bool {
        self.td_div == 0
    }

    pub fn kp_divisor(&self) -> f64 {
        self.kp_div as f64 * DIVISOR_UNIT
    }

    pub fn ti_divisor(&self) -> f64 {
        self.ti_div as f64 * DIVISOR_UNIT
    }

    pub fn td_divisor(&self) -> f64 {
        self.td_div as f64 * DIVISOR_UNIT
    }

    /// Apply the rule to an ultimate gain and ultimate period (seconds).
    pub fn apply(&self, ku: f64, pu: f64) -> RuleGains {
        let td = if self.is_pi_only() {
            0.0
        } else {
            pu / self.td_divisor()
        };
        RuleGains {
            kp: ku / self.kp_divisor(),
            ti: pu / self.ti_divisor(),
            td,
        }
    }
}

/// Fixed table of classical tuning rules, indexed by [`TuningMethod`].
pub struct TuningRuleTable;

const RULES: [TuningRule; 9] = [
    TuningRule::new(44, 24, 0),    // Ziegler-Nichols PI
    TuningRule::new(34, 40, 160),  // Ziegler-Nichols PID
    TuningRule::new(64, 9, 0),     // Tyreus-Luyben PI
    TuningRule::new(44, 9, 126),   // Tyreus-Luyben PID
    TuningRule::new(66, 80, 0),    // Ciancone-Marlin PI
    TuningRule::new(66, 88, 162),  // Ciancone-Marlin PID
    TuningRule::new(28, 50, 133),  // Pessen integral PID
    TuningRule::new(60, 40, 60),   // some overshoot PID
    TuningRule::new(100, 40, 60),  // no overshoot PID
];

impl TuningRuleTable {
    /// Divisors for `method`, or `None` for the adaptive method which has no
    /// fixed rule.
    pub fn lookup(method: TuningMethod) -> Option<TuningRule> {
        RULES.get(method.index() as usize).copied()
    }
}
