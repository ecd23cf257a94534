//! tt-core: stable foundation for thermotune.
//!
//! Contains:
//! - decimal (fixed-point `FixedDecimal<N>` used for every user-facing setting)
//! - numeric (Real + float guards)
//! - time (millisecond timestamps)
//! - error (shared error types)

pub mod decimal;
pub mod error;
pub mod numeric;
pub mod time;

// Re-exports: nice ergonomics for downstream crates
pub use decimal::*;
pub use error::{CoreError, CoreResult};
pub use numeric::*;
pub use time::*;
