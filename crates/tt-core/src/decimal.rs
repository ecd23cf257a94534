//! Fixed-point decimal values.
//!
//! `FixedDecimal<N>` stores an integer mantissa with exactly `N` implied
//! fractional digits. Every user-entered or persisted quantity (gains,
//! setpoints, relay step, noise band) lives in this form so that values
//! survive save/restore and display cycles without floating-point drift.
//! Continuous math converts to `f64` on demand.
//!
//! Values of different scales are different types. Moving between scales
//! goes through [`FixedDecimal::rescale`], which rounds half away from zero.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// Decimal with `N` implied fractional digits, backed by an `i32` mantissa.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedDecimal<const N: u32> {
    mantissa: i32,
}

/// Tuning gains (three fractional digits).
pub type Gain = FixedDecimal<3>;
/// Relay output step and other output-scale settings (one fractional digit).
pub type Step = FixedDecimal<1>;
/// Relay hysteresis half-width.
pub type NoiseBand = FixedDecimal<3>;
/// Process setpoints.
pub type Setpoint = FixedDecimal<1>;

impl<const N: u32> FixedDecimal<N> {
    /// `10^N`.
    pub const SCALE: i64 = 10i64.pow(N);
    pub const ZERO: Self = Self { mantissa: 0 };
    pub const MAX: Self = Self { mantissa: i32::MAX };
    pub const MIN: Self = Self { mantissa: i32::MIN };

    pub const fn from_mantissa(mantissa: i32) -> Self {
        Self { mantissa }
    }

    pub const fn mantissa(self) -> i32 {
        self.mantissa
    }

    /// Nearest representable value, saturating at the mantissa range.
    ///
    /// NaN maps to zero. Used on paths that must never fail, such as
    /// storing a tuning result.
    pub fn saturating_from_f64(value: f64) -> Self {
        // `as` saturates on overflow and maps NaN to 0.
        Self {
            mantissa: (value * Self::SCALE as f64).round() as i32,
        }
    }

    pub fn to_f64(self) -> f64 {
        self.mantissa as f64 / Self::SCALE as f64
    }

    /// Convert to another scale, rounding half away from zero when digits
    /// are dropped and saturating when the mantissa would overflow.
    pub fn rescale<const M: u32>(self) -> FixedDecimal<M> {
        FixedDecimal::<M>::from_wide(shift_scale(self.mantissa as i128, N, M))
    }

    /// Midpoint of two values, rounded half away from zero.
    pub fn midpoint(self, other: Self) -> Self {
        let sum = self.mantissa as i128 + other.mantissa as i128;
        Self::from_wide(div_round(sum, 2))
    }

    pub fn abs(self) -> Self {
        Self {
            mantissa: self.mantissa.saturating_abs(),
        }
    }

    pub fn is_negative(self) -> bool {
        self.mantissa < 0
    }

    pub fn is_zero(self) -> bool {
        self.mantissa == 0
    }

    fn from_wide(wide: i128) -> Self {
        Self {
            mantissa: wide.clamp(i32::MIN as i128, i32::MAX as i128) as i32,
        }
    }
}

/// Move a mantissa from `from` fractional digits to `to` fractional digits.
fn shift_scale(m: i128, from: u32, to: u32) -> i128 {
    if to >= from {
        m.saturating_mul(10i128.pow(to - from))
    } else {
        div_round(m, 10i128.pow(from - to))
    }
}

/// Integer division rounding half away from zero. `d` must be positive.
fn div_round(n: i128, d: i128) -> i128 {
    let q = n / d;
    let r = n % d;
    if 2 * r.abs() >= d { q + n.signum() } else { q }
}

impl<const N: u32> TryFrom<f64> for FixedDecimal<N> {
    type Error = CoreError;

    fn try_from(value: f64) -> CoreResult<Self> {
        if !value.is_finite() {
            return Err(CoreError::NonFinite {
                what: "fixed decimal",
                value,
            });
        }
        let scaled = (value * Self::SCALE as f64).round();
        if scaled < i32::MIN as f64 || scaled > i32::MAX as f64 {
            return Err(CoreError::OutOfRange {
                what: "fixed decimal",
                value,
            });
        }
        Ok(Self {
            mantissa: scaled as i32,
        })
    }
}

impl<const N: u32> From<FixedDecimal<N>> for f64 {
    fn from(value: FixedDecimal<N>) -> Self {
        value.to_f64()
    }
}

impl<const N: u32> Add for FixedDecimal<N> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            mantissa: self.mantissa.saturating_add(rhs.mantissa),
        }
    }
}

impl<const N: u32> Sub for FixedDecimal<N> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            mantissa: self.mantissa.saturating_sub(rhs.mantissa),
        }
    }
}

impl<const N: u32> Neg for FixedDecimal<N> {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            mantissa: self.mantissa.saturating_neg(),
        }
    }
}

impl<const N: u32> AddAssign for FixedDecimal<N> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<const N: u32> SubAssign for FixedDecimal<N> {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<const N: u32> fmt::Display for FixedDecimal<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.mantissa as i64;
        let sign = if m < 0 { "-" } else { "" };
        let abs = m.abs();
        if N == 0 {
            return write!(f, "{sign}{abs}");
        }
        let int = abs / Self::SCALE;
        let frac = abs % Self::SCALE;
        write!(f, "{sign}{int}.{frac:0width$}", width = N as usize)
    }
}

impl<const N: u32> FromStr for FixedDecimal<N> {
    type Err = CoreError;

    /// Parse plain decimal text such as `"12.5"`, `"-0.125"` or `"+3"`.
    ///
    /// Digits beyond the `N`-th fractional place round half away from zero.
    fn from_str(s: &str) -> CoreResult<Self> {
        let parse_err = |reason| CoreError::Parse {
            input: s.to_string(),
            reason,
        };

        let text = s.trim();
        let (negative, body) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(parse_err("no digits"));
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(parse_err("unexpected character"));
        }

        let mut wide: i128 = 0;
        for b in int_part.bytes() {
            wide = wide * 10 + (b - b'0') as i128;
            if wide > i32::MAX as i128 {
                return Err(parse_err("out of range"));
            }
        }
        let mut frac_digits = frac_part.bytes();
        for _ in 0..N {
            let digit = frac_digits.next().map_or(0, |b| (b - b'0') as i128);
            wide = wide * 10 + digit;
        }
        if frac_digits.next().is_some_and(|b| b >= b'5') {
            wide += 1;
        }
        if negative {
            wide = -wide;
        }
        if wide < i32::MIN as i128 || wide > i32::MAX as i128 {
            return Err(parse_err("out of range"));
        }
        Ok(Self {
            mantissa: wide as i32,
        })
    }
}

#[cfg(feature = "serde")]
impl<const N: u32> serde::Serialize for FixedDecimal<N> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

#[cfg(feature = "serde")]
impl<'de, const N: u32> serde::Deserialize<'de> for FixedDecimal<N> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Self::try_from(value).map_err(serde::de::Error::custom)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn ordering_agrees_with_f64(a in any::<i32>(), b in any::<i32>()) {
            let x = Gain::from_mantissa(a);
            let y = Gain::from_mantissa(b);
            prop_assert_eq!(x.cmp(&y), x.to_f64().partial_cmp(&y.to_f64()).unwrap());
        }

        #[test]
        fn down_up_rescale_within_one_unit(m in -1_000_000_000i32..1_000_000_000) {
            let x = Gain::from_mantissa(m);
            let back: Gain = x.rescale::<1>().rescale();
            // One unit in the last retained digit at scale 1 is 100 at scale 3.
            prop_assert!((back.mantissa() as i64 - m as i64).abs() <= 50);
        }

        #[test]
        fn up_down_rescale_is_exact(m in -200_000i32..200_000) {
            let x = Step::from_mantissa(m);
            let back: Step = x.rescale::<3>().rescale();
            prop_assert_eq!(back, x);
        }

        #[test]
        fn display_parses_back(m in any::<i32>()) {
            let x = Gain::from_mantissa(m);
            let text = x.to_string();
            let frac = text.split_once('.').map(|(_, f)| f.len());
            prop_assert_eq!(frac, Some(3));
            prop_assert_eq!(text.parse::<Gain>().unwrap(), x);
        }
    }
}
