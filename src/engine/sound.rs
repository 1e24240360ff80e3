//! SpatialSound: per-tag emitter state owned by the engine.

use serde::{Deserialize, Serialize};

use super::backend::EmitterId;

/// Listener-relative position in meters (x right, y up, -z forward).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Distance from the listener at the origin.
    pub fn magnitude(&self) -> f64 {
        self.distance_to(&Position::default())
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Derived view of the motion/beep state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundState {
    Moving,
    StationarySilent,
    StationaryBeeping,
}

/// One tracked tag and its backend emitter.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialSound {
    id: String,
    pub(crate) serial: u64,
    pub(crate) emitter: EmitterId,
    pub(crate) frequency: f32,
    pub(crate) position: Position,
    pub(crate) motion: bool,
    pub(crate) beeping: bool,
    pub(crate) last_sample_time: f64,
    pub(crate) last_beep_time: f64,
    /// Last gain target issued by the tick pass; `None` after a beep or
    /// removal took over the gain timeline.
    pub(crate) gain_target: Option<f32>,
}

impl SpatialSound {
    pub(crate) fn new(
        id: String,
        serial: u64,
        emitter: EmitterId,
        frequency: f32,
        position: Position,
        now: f64,
    ) -> Self {
        Self {
            id,
            serial,
            emitter,
            frequency,
            position,
            motion: false,
            beeping: false,
            last_sample_time: now,
            last_beep_time: now,
            gain_target: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Per-instance counter; differs between a removed sound and a later
    /// sound created with the same id.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn emitter(&self) -> EmitterId {
        self.emitter
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn is_moving(&self) -> bool {
        self.motion
    }

    pub fn is_beeping(&self) -> bool {
        self.beeping
    }

    pub fn last_sample_time(&self) -> f64 {
        self.last_sample_time
    }

    pub fn last_beep_time(&self) -> f64 {
        self.last_beep_time
    }

    pub fn state(&self) -> SoundState {
        match (self.motion, self.beeping) {
            (true, _) => SoundState::Moving,
            (false, true) => SoundState::StationaryBeeping,
            (false, false) => SoundState::StationarySilent,
        }
    }

    pub fn snapshot(&self) -> SoundSnapshot {
        SoundSnapshot {
            id: self.id.clone(),
            position: self.position,
            distance: self.position.magnitude(),
            frequency: self.frequency,
            state: self.state(),
            last_beep_time: self.last_beep_time,
        }
    }
}

/// Serializable copy of one sound for the CLI and debug surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundSnapshot {
    pub id: String,
    pub position: Position,
    pub distance: f64,
    pub frequency: f32,
    pub state: SoundState,
    pub last_beep_time: f64,
}
