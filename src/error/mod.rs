// Error types for the spatial tag audio engine
//
// This module defines custom error types for the audio backend, tag feeds and
// runtime configuration, each carrying a stable numeric code so that CLI and
// HTTP surfaces can report failures consistently.

mod audio;
mod config;
mod feed;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use config::{ConfigError, ConfigErrorCodes};
pub use feed::{log_feed_error, FeedError, FeedErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
