//! tt-sim: synthetic processes for exercising the control loop offline.
//!
//! The only model is a first-order-plus-dead-time process, the usual
//! stand-in for a heated mass driven through a slow actuator. It is a test
//! fixture and a CLI demo plant, not a hardware driver.

pub mod error;
pub mod process;

pub use error::{SimError, SimResult};
pub use process::{FirstOrderProcess, MAX_DELAY_SAMPLES, ProcessParams};
