//! Sampled execution primitives for digital controllers.
//!
//! Controllers operate in sampled/digital mode with a configured update interval.
//! Between samples the caller holds the last output (zero-order hold).
//!
//! This module provides the millisecond timing gate shared by the PID loop and
//! the autotuner.

use serde::{Deserialize, Serialize};
use tt_core::{Millis, elapsed_ms};

use crate::error::{ControlError, ControlResult};

/// Sample configuration for a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleConfig {
    /// Sample interval in milliseconds.
    pub interval_ms: Millis,
}

impl SampleConfig {
    /// Create a new sample configuration.
    ///
    /// # Arguments
    ///
    /// * `interval_ms` - Sample interval in milliseconds (must be positive)
    pub fn new(interval_ms: Millis) -> ControlResult<Self> {
        if interval_ms == 0 {
            return Err(ControlError::InvalidArg {
                what: "sample interval must be positive",
            });
        }
        Ok(Self { interval_ms })
    }

    /// Sample interval in seconds.
    pub fn interval_s(&self) -> f64 {
        self.interval_ms as f64 / 1000.0
    }
}

/// Sample clock tracks when a controller should execute.
///
/// The first query after construction or [`reset`](Self::reset) always
/// samples, so a freshly started loop acts immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleClock {
    /// Sample configuration.
    pub config: SampleConfig,
    last_sample: Option<Millis>,
}

impl SampleClock {
    pub fn new(config: SampleConfig) -> Self {
        Self {
            config,
            last_sample: None,
        }
    }

    pub fn interval_ms(&self) -> Millis {
        self.config.interval_ms
    }

    /// Time of the last executed sample, if any.
    pub fn last_sample(&self) -> Option<Millis> {
        self.last_sample
    }

    /// Check if a sample should occur at `now`.
    pub fn should_sample(&self, now: Millis) -> bool {
        match self.last_sample {
            None => true,
            Some(last) => elapsed_ms(now, last) >= self.config.interval_ms,
        }
    }

    /// Record that a sample was executed at `now`.
    pub fn mark(&mut self, now: Millis) {
        self.last_sample = Some(now);
    }

    /// Change the interval without losing the last sample time.
    pub fn set_interval(&mut self, interval_ms: Millis) -> ControlResult<()> {
        self.config = SampleConfig::new(interval_ms)?;
        Ok(())
    }

    /// Forget the last sample so the next query samples immediately.
    pub fn reset(&mut self) {
        self.last_sample = None;
    }

    /// Milliseconds until the next sample is due.
    pub fn time_until_sample(&self, now: Millis) -> Millis {
        match self.last_sample {
            None => 0,
            Some(last) => self
                .config
                .interval_ms
                .saturating_sub(elapsed_ms(now, last)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_creation() {
        let config = SampleConfig::new(250).unwrap();
        assert_eq!(config.interval_ms, 250);
        assert!((config.interval_s() - 0.25).abs() < 1e-10);
    }

    #[test]
    fn sample_config_rejects_zero() {
        assert!(SampleConfig::new(0).is_err());
    }

    #[test]
    fn sample_clock_basic() {
        let mut clock = SampleClock::new(SampleConfig::new(100).unwrap());

        // First query always samples
        assert!(clock.should_sample(5_000));
        clock.mark(5_000);

        assert!(!clock.should_sample(5_050));
        assert!(clock.should_sample(5_100));

        clock.mark(5_100);
        assert!(!clock.should_sample(5_100));
        assert!(clock.should_sample(5_200));
    }

    #[test]
    fn sample_clock_reset_and_interval_change() {
        let mut clock = SampleClock::new(SampleConfig::new(1000).unwrap());
        clock.mark(0);
        assert!(!clock.should_sample(500));

        clock.set_interval(400).unwrap();
        assert!(clock.should_sample(500));
        assert!(clock.set_interval(0).is_err());
        assert_eq!(clock.interval_ms(), 400);

        clock.reset();
        assert_eq!(clock.last_sample(), None);
        assert!(clock.should_sample(0));
    }

    #[test]
    fn sample_clock_time_until_sample() {
        let mut clock = SampleClock::new(SampleConfig::new(100).unwrap());
        assert_eq!(clock.time_until_sample(0), 0);

        clock.mark(0);
        assert_eq!(clock.time_until_sample(0), 100);
        assert_eq!(clock.time_until_sample(50), 50);
        assert_eq!(clock.time_until_sample(150), 0);
    }
}
