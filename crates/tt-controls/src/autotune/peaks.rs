//! Lookback window and peak tracking for the relay experiment.

use tt_core::{FixedDecimal, Millis};

use super::ring::RingBuffer;

/// Upper bound on the lookback window length.
pub const MAX_LOOKBACK_SAMPLES: usize = 100;

/// Number of peaks kept for the convergence test.
pub const PEAK_HISTORY: usize = 5;

/// One sample classified against the lookback window that preceded it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSample {
    pub is_max: bool,
    pub is_min: bool,
    /// `max - min` of the window before this sample.
    pub spread: f64,
    /// Absolute midpoint of that window.
    pub level: f64,
}

/// Recent measurements stored relative to a running offset.
///
/// After every classified sample the stored values are recentred on the
/// window midpoint, so slow drift in the absolute measurement never pushes
/// samples out of the fixed-point range or defeats the max/min tests.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: RingBuffer<FixedDecimal<3>, MAX_LOOKBACK_SAMPLES>,
    offset: f64,
}

impl SampleWindow {
    pub fn new(len: usize, origin: f64) -> Self {
        Self {
            samples: RingBuffer::with_limit(len),
            offset: origin,
        }
    }

    /// Drop all samples and measure relative to `origin` from now on.
    pub fn restart(&mut self, origin: f64) {
        self.samples.clear();
        self.offset = origin;
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn is_full(&self) -> bool {
        self.samples.is_full()
    }

    /// Add a measurement.
    ///
    /// Returns `None` while the window is still filling; extremes are not
    /// trusted until it is full.
    pub fn push(&mut self, value: f64) -> Option<WindowSample> {
        let relative = FixedDecimal::<3>::saturating_from_f64(value - self.offset);
        if !self.samples.is_full() {
            self.samples.push(relative);
            return None;
        }

        let mut max = relative;
        let mut min = relative;
        if let Some(first) = self.samples.front() {
            max = first;
            min = first;
        }
        for s in self.samples.iter() {
            max = max.max(s);
            min = min.min(s);
        }

        let is_max = relative >= max;
        let is_min = relative <= min;
        self.samples.push(relative);

        let mid = max.midpoint(min);
        self.samples.for_each_mut(|s| *s -= mid);
        self.offset += mid.to_f64();

        Some(WindowSample {
            is_max,
            is_min,
            spread: (max - min).to_f64(),
            level: self.offset,
        })
    }
}

/// A recorded extreme of the induced oscillation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Peak {
    pub value: f64,
    pub time: Millis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeakKind {
    None,
    Maximum,
    Minimum,
}

/// Amplitude statistics over the four most recent completed peaks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Amplitude {
    /// Mean absolute peak-to-peak difference, halved.
    pub induced: f64,
    pub abs_max: f64,
    pub abs_min: f64,
}

impl Amplitude {
    /// Relative disagreement between the half spread and the induced
    /// amplitude.
    pub fn convergence_criterion(&self) -> f64 {
        (0.5 * (self.abs_max - self.abs_min) - self.induced) / self.induced
    }
}

/// Alternating maxima/minima, newest first.
///
/// Entry 0 is the extreme currently being tracked: while the same polarity
/// keeps being confirmed it is overwritten with the newer value and time,
/// so completed entries hold the actual apex of each half cycle.
#[derive(Debug, Clone)]
pub struct PeakTracker {
    peaks: RingBuffer<Peak, PEAK_HISTORY>,
    kind: PeakKind,
    count: u32,
    last_alternation: Millis,
}

impl PeakTracker {
    pub fn new(value: f64, now: Millis) -> Self {
        let mut peaks = RingBuffer::new();
        peaks.push(Peak { value, time: now });
        Self {
            peaks,
            kind: PeakKind::None,
            count: 0,
            last_alternation: now,
        }
    }

    /// Number of polarity alternations seen.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn get(&self, index: usize) -> Option<Peak> {
        self.peaks.get(index)
    }

    /// Time of the last alternation, or of the last explicit restart.
    pub fn last_alternation(&self) -> Millis {
        self.last_alternation
    }

    pub fn restart_timer(&mut self, now: Millis) {
        self.last_alternation = now;
    }

    /// Record a classified sample. Returns true on a polarity alternation.
    pub fn record(&mut self, sample: &WindowSample, value: f64, now: Millis) -> bool {
        let previous = self.kind;
        let alternated = if sample.is_max {
            self.kind = PeakKind::Maximum;
            previous == PeakKind::Minimum
        } else if sample.is_min {
            self.kind = PeakKind::Minimum;
            previous == PeakKind::Maximum
        } else {
            false
        };

        let peak = Peak { value, time: now };
        if alternated {
            self.count += 1;
            self.last_alternation = now;
            self.peaks.push(peak);
        } else if sample.is_max || sample.is_min {
            if let Some(front) = self.peaks.front_mut() {
                *front = peak;
            }
        }
        alternated
    }

    /// Amplitude over peaks 1..=4, once the history is full.
    pub fn amplitude(&self) -> Option<Amplitude> {
        let p = |i| self.peaks.get(i).map(|peak: Peak| peak.value);
        let first = p(1)?;
        let mut induced = 0.0;
        let mut abs_max = first;
        let mut abs_min = first;
        let mut prev = first;
        for i in 2..PEAK_HISTORY {
            let v = p(i)?;
            induced += (v - prev).abs();
            abs_max = abs_max.max(v);
            abs_min = abs_min.min(v);
            prev = v;
        }
        Some(Amplitude {
            induced: induced / 6.0,
            abs_max,
            abs_min,
        })
    }

    /// Mean of the two most recent full cycles, in seconds.
    pub fn ultimate_period_s(&self) -> Option<f64> {
        let t = |i| self.peaks.get(i).map(|peak: Peak| peak.time as f64);
        let cycles = (t(1)? - t(3)?) + (t(2)? - t(4)?);
        Some(cycles / 2000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(is_max: bool, is_min: bool) -> WindowSample {
        WindowSample {
            is_max,
            is_min,
            spread: 1.0,
            level: 0.0,
        }
    }

    #[test]
    fn window_fills_before_classifying() {
        let mut w = SampleWindow::new(3, 20.0);
        assert!(w.push(20.0).is_none());
        assert!(w.push(21.0).is_none());
        assert!(w.push(22.0).is_none());
        assert!(w.is_full());

        let s = w.push(23.0).unwrap();
        assert!(s.is_max);
        assert!(!s.is_min);
        assert!((s.spread - 2.0).abs() < 1e-9);
        assert!((s.level - 21.0).abs() < 1e-9);
    }

    #[test]
    fn window_recentres_on_midpoint() {
        let mut w = SampleWindow::new(4, 0.0);
        for v in [100.0, 100.5, 101.0, 100.2] {
            w.push(v);
        }
        let s = w.push(99.0).unwrap();
        assert!(s.is_min);
        assert!((w.offset() - 100.5).abs() < 1e-9);

        // Offset tracks the drift while classification stays relative
        let s = w.push(100.6).unwrap();
        assert!(!s.is_max && !s.is_min);
        assert!((s.level - 100.0).abs() < 1e-9);
    }

    #[test]
    fn flat_window_reports_both_extremes() {
        let mut w = SampleWindow::new(2, 5.0);
        w.push(5.0);
        w.push(5.0);
        let s = w.push(5.0).unwrap();
        assert!(s.is_max && s.is_min);
        assert_eq!(s.spread, 0.0);
    }

    #[test]
    fn restart_clears_samples() {
        let mut w = SampleWindow::new(2, 0.0);
        w.push(1.0);
        w.push(2.0);
        w.restart(7.5);
        assert!(!w.is_full());
        assert_eq!(w.offset(), 7.5);
    }

    #[test]
    fn tracker_counts_only_alternations() {
        let mut t = PeakTracker::new(0.0, 0);
        assert!(!t.record(&sample(true, false), 1.0, 10));
        assert!(!t.record(&sample(true, false), 1.5, 20));
        assert_eq!(t.count(), 0);
        // Front entry refined to the latest maximum
        assert_eq!(t.get(0), Some(Peak { value: 1.5, time: 20 }));

        assert!(t.record(&sample(false, true), -1.0, 30));
        assert_eq!(t.count(), 1);
        assert_eq!(t.last_alternation(), 30);
        assert_eq!(t.get(1), Some(Peak { value: 1.5, time: 20 }));

        assert!(!t.record(&sample(false, false), 0.0, 40));
        assert_eq!(t.last_alternation(), 30);
    }

    #[test]
    fn amplitude_and_period_need_full_history() {
        let mut t = PeakTracker::new(0.0, 0);
        assert!(t.amplitude().is_none());
        assert!(t.ultimate_period_s().is_none());

        // Square-ish oscillation of amplitude 1 with a 20 s period
        let extremes = [(true, 1.0), (false, -1.0), (true, 1.0), (false, -1.0), (true, 1.0)];
        for (i, (up, v)) in extremes.iter().enumerate() {
            let time = 10_000 * (i as Millis + 1);
            t.record(&sample(*up, !*up), *v, time);
        }
        t.record(&sample(false, true), -1.0, 60_000);
        assert_eq!(t.count(), 5);

        let a = t.amplitude().unwrap();
        assert!((a.induced - 1.0).abs() < 1e-12);
        assert_eq!((a.abs_max, a.abs_min), (1.0, -1.0));
        assert!(a.convergence_criterion().abs() < 1e-12);
        assert!((t.ultimate_period_s().unwrap() - 20.0).abs() < 1e-12);
    }
}
