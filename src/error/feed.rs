// Tag feed error types and constants

use crate::error::ErrorCode;
use log::warn;
use std::fmt;

/// Feed error code constants
///
/// Error code range: 2001-2005
pub struct FeedErrorCodes {}

impl FeedErrorCodes {
    /// Feed was started twice without a stop in between
    pub const ALREADY_RUNNING: i32 = 2001;

    /// No Tokio runtime is available to host the feed worker
    pub const NO_RUNTIME: i32 = 2002;

    /// Connecting to the message endpoint failed
    pub const CONNECT_FAILED: i32 = 2003;

    /// The established connection failed mid-stream
    pub const TRANSPORT: i32 = 2004;

    /// A payload could not be decoded into tag samples
    pub const MALFORMED_PAYLOAD: i32 = 2005;
}

/// Log a feed error with structured context
///
/// Feed errors are never fatal, so they are reported at warn level.
pub fn log_feed_error(err: &FeedError, context: &str) {
    warn!(
        "Feed error in {}: code={}, component=DataFeed, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Tag feed errors
///
/// Error code range: 2001-2005
#[derive(Debug, Clone, PartialEq)]
pub enum FeedError {
    /// Feed is already running
    AlreadyRunning,

    /// No Tokio runtime in scope
    NoRuntime,

    /// Could not establish the connection
    ConnectFailed { url: String, reason: String },

    /// Connection broke while streaming
    Transport { reason: String },

    /// Payload rejected during decoding
    MalformedPayload { reason: String },
}

impl ErrorCode for FeedError {
    fn code(&self) -> i32 {
        match self {
            FeedError::AlreadyRunning => FeedErrorCodes::ALREADY_RUNNING,
            FeedError::NoRuntime => FeedErrorCodes::NO_RUNTIME,
            FeedError::ConnectFailed { .. } => FeedErrorCodes::CONNECT_FAILED,
            FeedError::Transport { .. } => FeedErrorCodes::TRANSPORT,
            FeedError::MalformedPayload { .. } => FeedErrorCodes::MALFORMED_PAYLOAD,
        }
    }

    fn message(&self) -> String {
        match self {
            FeedError::AlreadyRunning => {
                "Feed already running. Call stop() first.".to_string()
            }
            FeedError::NoRuntime => {
                "No Tokio runtime available; start the feed from within a runtime".to_string()
            }
            FeedError::ConnectFailed { url, reason } => {
                format!("Failed to connect to {}: {}", url, reason)
            }
            FeedError::Transport { reason } => format!("Connection failed: {}", reason),
            FeedError::MalformedPayload { reason } => {
                format!("Malformed tag payload: {}", reason)
            }
        }
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FeedError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for FeedError {}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::MalformedPayload {
            reason: err.to_string(),
        }
    }
}
