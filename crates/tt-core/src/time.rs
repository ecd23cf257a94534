//! Millisecond timestamps.
//!
//! The control core never reads a clock itself; callers pass a monotonic
//! millisecond counter into every tick.

/// Monotonic timestamp in milliseconds.
pub type Millis = u64;

/// Milliseconds elapsed from `since` to `now`.
///
/// Saturates at zero if `now` is earlier than `since`.
pub fn elapsed_ms(now: Millis, since: Millis) -> Millis {
    now.saturating_sub(since)
}

/// Convert a millisecond span to seconds.
pub fn ms_to_secs(ms: Millis) -> f64 {
    ms as f64 / 1000.0
}
