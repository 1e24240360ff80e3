// Audio backend error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants
///
/// Error code range: 1001-1006
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// Backend has not been initialized (no output clock yet)
    pub const BACKEND_NOT_READY: i32 = 1001;

    /// Emitter handle does not refer to a live emitter
    pub const UNKNOWN_EMITTER: i32 = 1002;

    /// Command ring towards the audio thread is full
    pub const COMMAND_QUEUE_FULL: i32 = 1003;

    /// Failed to open audio stream
    pub const STREAM_OPEN_FAILED: i32 = 1004;

    /// Hardware error occurred
    pub const HARDWARE_ERROR: i32 = 1005;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1006;
}

/// Log an audio error with structured context
///
/// Logs the numeric code and message together with the call site context.
/// The logging is non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=AudioBackend, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio backend errors
///
/// These errors cover emitter management, parameter scheduling and
/// realtime stream setup.
///
/// Error code range: 1001-1006
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Backend has not been initialized yet
    BackendNotReady,

    /// Emitter handle is not (or no longer) live
    UnknownEmitter { emitter: u64 },

    /// Realtime command queue is saturated
    CommandQueueFull,

    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// Hardware error occurred
    HardwareError { details: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::BackendNotReady => AudioErrorCodes::BACKEND_NOT_READY,
            AudioError::UnknownEmitter { .. } => AudioErrorCodes::UNKNOWN_EMITTER,
            AudioError::CommandQueueFull => AudioErrorCodes::COMMAND_QUEUE_FULL,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::BackendNotReady => "Audio backend not initialized yet".to_string(),
            AudioError::UnknownEmitter { emitter } => {
                format!("Emitter {} is not live", emitter)
            }
            AudioError::CommandQueueFull => {
                "Audio command queue is full; the output stream is not draining".to_string()
            }
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}
