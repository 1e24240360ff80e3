// VisionR Audio - spatial tag sonification engine
// Tracked fiducial tags rendered as positioned emitters: continuous tone while
// moving, periodic beep while stationary.

// Module declarations
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod http;
pub mod projection;
pub mod render;
pub mod session;

// Re-exports for convenience
pub use config::{AppConfig, EngineConfig, ParamPatch, SharedConfig};
pub use engine::{Position, SoundEngine, SoundSnapshot, SoundState};
pub use error::{AudioError, ConfigError, ErrorCode, FeedError};
pub use feed::{ConnectionStatus, DataFeed, NetworkFeed, SimulatedFeed, TagSample};
pub use session::Session;

use tracing_subscriber::filter::LevelFilter;

/// Install the global fmt subscriber.
///
/// `level` falls back to `VISIONR_LOG`, then `info`. Unknown levels fall back
/// to `info`. Calling this twice is harmless. `log` records from synchronous
/// code are captured through the `tracing-log` bridge the fmt subscriber
/// installs.
pub fn init_logging(level: Option<&str>) {
    let requested = level
        .map(str::to_string)
        .or_else(|| std::env::var("VISIONR_LOG").ok())
        .unwrap_or_else(|| "info".to_string());
    let filter = requested
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    if tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
    {
        log::debug!("[Logging] Initialized at {}", filter);
    }
}
