//! Backend abstractions for the spatial sound engine.
//!
//! A backend owns the emitters (tone + gain + positional panner) and the
//! monotonic clock that every ramp is scheduled against. The engine only talks
//! to this trait, so the realtime output, the offline renderer and the
//! recording fake used by tests are interchangeable.

use serde::{Deserialize, Serialize};

use crate::config::PannerSettings;
use crate::engine::sound::Position;
use crate::error::AudioError;

mod mixer;
mod param;
mod recording;
mod software;

#[cfg(not(target_os = "android"))]
mod cpal_stream;

#[cfg(not(target_os = "android"))]
pub use cpal_stream::{CpalBackend, CpalOutput};
pub use mixer::{distance_gain, equal_power_pan, Mixer};
pub use param::AudioParam;
pub use recording::{BackendCall, FailingCall, RecordingBackend};
pub use software::SoftwareBackend;

/// Opaque handle to a backend emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmitterId(pub u64);

/// Everything the backend needs to build an emitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmitterSpec {
    pub frequency: f32,
    pub position: Position,
    pub panner: PannerSettings,
    pub initial_gain: f32,
}

/// Automatable emitter parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Param {
    Gain,
    Frequency,
    PositionX,
    PositionY,
    PositionZ,
}

/// Scheduled parameter change, times in backend clock seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Automation {
    /// Exponential approach toward `target` starting at `start`
    SetTarget {
        param: Param,
        target: f32,
        start: f64,
        time_constant: f64,
    },
    /// Step to `value` at `time`
    SetValueAt { param: Param, value: f32, time: f64 },
    /// Linear ramp from the previous event reaching `value` at `end_time`
    LinearRampTo {
        param: Param,
        value: f32,
        end_time: f64,
    },
    /// Drop events after `at` and hold the value reached at `at`
    CancelAndHold { param: Param, at: f64 },
}

impl Automation {
    pub fn param(&self) -> Param {
        match *self {
            Automation::SetTarget { param, .. }
            | Automation::SetValueAt { param, .. }
            | Automation::LinearRampTo { param, .. }
            | Automation::CancelAndHold { param, .. } => param,
        }
    }

    /// Apply to a parameter timeline.
    pub fn apply_to(&self, target_param: &mut AudioParam) {
        match *self {
            Automation::SetTarget {
                target,
                start,
                time_constant,
                ..
            } => target_param.set_target_at(target, start, time_constant),
            Automation::SetValueAt { value, time, .. } => target_param.set_value_at(value, time),
            Automation::LinearRampTo {
                value, end_time, ..
            } => target_param.linear_ramp_to(value, end_time),
            Automation::CancelAndHold { at, .. } => target_param.cancel_and_hold(at),
        }
    }
}

/// Command sent to an audio thread that owns a [`Mixer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendCommand {
    CreateEmitter { id: EmitterId, spec: EmitterSpec },
    Automate { id: EmitterId, automation: Automation },
    Stop { id: EmitterId, when: f64 },
    Release { id: EmitterId },
}

/// Trait implemented by every audio backend.
///
/// Calls are made from the single engine thread. Implementations must not
/// block; realtime backends hand commands to their audio thread.
pub trait AudioBackend: Send {
    /// False until the backend has a running clock and can create emitters.
    fn is_ready(&self) -> bool;

    /// Backend monotonic clock in seconds.
    fn current_time(&self) -> f64;

    fn create_emitter(&mut self, spec: EmitterSpec) -> Result<EmitterId, AudioError>;

    fn automate(&mut self, emitter: EmitterId, automation: Automation) -> Result<(), AudioError>;

    /// Silence the tone at `when`; the emitter stays allocated.
    fn stop_emitter(&mut self, emitter: EmitterId, when: f64) -> Result<(), AudioError>;

    /// Disconnect and free the emitter.
    fn release_emitter(&mut self, emitter: EmitterId) -> Result<(), AudioError>;
}

impl<B: AudioBackend + ?Sized> AudioBackend for Box<B> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn current_time(&self) -> f64 {
        (**self).current_time()
    }

    fn create_emitter(&mut self, spec: EmitterSpec) -> Result<EmitterId, AudioError> {
        (**self).create_emitter(spec)
    }

    fn automate(&mut self, emitter: EmitterId, automation: Automation) -> Result<(), AudioError> {
        (**self).automate(emitter, automation)
    }

    fn stop_emitter(&mut self, emitter: EmitterId, when: f64) -> Result<(), AudioError> {
        (**self).stop_emitter(emitter, when)
    }

    fn release_emitter(&mut self, emitter: EmitterId) -> Result<(), AudioError> {
        (**self).release_emitter(emitter)
    }
}
