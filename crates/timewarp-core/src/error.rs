//! Error types for timewarp

use thiserror::Error;

/// Core timewarp errors
#[derive(Error, Debug)]
pub enum TimewarpError {
    // Argument errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Guard errors
    #[error("Safe mode violation: permanent override outside an active scope")]
    SafeModeViolation,
}

/// Result type for timewarp operations
pub type TimewarpResult<T> = Result<T, TimewarpError>;
