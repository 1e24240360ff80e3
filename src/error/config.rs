// Runtime configuration error types

use crate::error::ErrorCode;
use std::fmt;

/// Configuration error code constants
///
/// Error code range: 3001-3004
pub struct ConfigErrorCodes {}

impl ConfigErrorCodes {
    /// Textual input did not parse as a finite number
    pub const NOT_A_NUMBER: i32 = 3001;

    /// Numeric input was outside the accepted range
    pub const OUT_OF_RANGE: i32 = 3002;

    /// Parameter patch carried no fields
    pub const EMPTY_PATCH: i32 = 3003;

    /// Shared configuration lock was poisoned
    pub const LOCK_POISONED: i32 = 3004;
}

/// Errors raised by the live-tunable configuration setters
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Input was not a finite number
    NotANumber { field: &'static str, input: String },

    /// Input was outside the accepted range
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Patch did not set any field
    EmptyPatch,

    /// Shared configuration lock was poisoned
    LockPoisoned,
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            ConfigError::NotANumber { .. } => ConfigErrorCodes::NOT_A_NUMBER,
            ConfigError::OutOfRange { .. } => ConfigErrorCodes::OUT_OF_RANGE,
            ConfigError::EmptyPatch => ConfigErrorCodes::EMPTY_PATCH,
            ConfigError::LockPoisoned => ConfigErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            ConfigError::NotANumber { field, input } => {
                format!("{} expects a finite number (got {:?})", field, input)
            }
            ConfigError::OutOfRange {
                field,
                value,
                min,
                max,
            } => format!("{} must be within {}..={} (got {})", field, min, max, value),
            ConfigError::EmptyPatch => "at least one parameter must be provided".to_string(),
            ConfigError::LockPoisoned => "engine configuration lock poisoned".to_string(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for ConfigError {}
