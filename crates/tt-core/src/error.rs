use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Value {value} out of range for {what}")]
    OutOfRange { what: &'static str, value: f64 },

    #[error("Cannot parse decimal from {input:?}: {reason}")]
    Parse { input: String, reason: &'static str },
}
