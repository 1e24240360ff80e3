//! Engine module housing the spatial sound core.
//!
//! This module exposes trait-based backends (`backend`), the frame clock
//! abstractions (`clock`), and the `SoundEngine` state machine (`core`).

pub mod backend;
pub mod clock;
pub mod core;
pub mod scheduler;
pub mod sound;

#[cfg(not(target_os = "android"))]
pub use backend::{CpalBackend, CpalOutput};
pub use backend::{AudioBackend, RecordingBackend, SoftwareBackend};
pub use clock::{Clock, FrameTicker, ManualClock, SystemClock};
pub use self::core::{EngineEvent, EngineEventKind, EngineStats, SoundEngine};
pub use sound::{Position, SoundSnapshot, SoundState, SpatialSound};
