use crate::CoreError;

/// Floating point type used throughout system
pub type Real = f64;

/// Threshold below which the tuner treats a quantity as zero.
pub const NEAR_ZERO: Real = 1e-10;

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Finite and strictly positive.
pub fn ensure_positive(v: Real, what: &'static str) -> Result<Real, CoreError> {
    let v = ensure_finite(v, what)?;
    if v > 0.0 {
        Ok(v)
    } else {
        Err(CoreError::OutOfRange { what, value: v })
    }
}

/// Relative error of `actual` against a nonzero `expected`.
pub fn relative_error(actual: Real, expected: Real) -> Real {
    ((actual - expected) / expected).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
    }

    #[test]
    fn ensure_positive_rejects_zero() {
        assert!(ensure_positive(0.0, "tau").is_err());
        assert!(ensure_positive(-1.0, "tau").is_err());
        assert_eq!(ensure_positive(2.0, "tau").unwrap(), 2.0);
    }

    #[test]
    fn relative_error_basic() {
        assert!((relative_error(105.0, 100.0) - 0.05).abs() < 1e-12);
        assert!((relative_error(95.0, 100.0) - 0.05).abs() < 1e-12);
    }
}
