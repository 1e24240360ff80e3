use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AudioError;

use super::{AudioBackend, AudioParam, Automation, EmitterId, EmitterSpec, Param};
use crate::engine::clock::{Clock, ManualClock};

/// Call recorded by [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Create { emitter: EmitterId, spec: EmitterSpec },
    Automate { emitter: EmitterId, automation: Automation },
    Stop { emitter: EmitterId, when: f64 },
    Release { emitter: EmitterId },
}

impl BackendCall {
    pub fn emitter(&self) -> EmitterId {
        match self {
            BackendCall::Create { emitter, .. }
            | BackendCall::Automate { emitter, .. }
            | BackendCall::Stop { emitter, .. }
            | BackendCall::Release { emitter } => *emitter,
        }
    }
}

/// Backend operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailingCall {
    Create,
    Automate,
    Stop,
    Release,
}

struct RecordedEmitter {
    gain: AudioParam,
    stopped_at: Option<f64>,
}

/// Backend without audio output.
///
/// Keeps time from an injected clock, records every call and evaluates the
/// gain timeline of each emitter, so tests can assert on both the schedule
/// and its audible effect. The CLI uses it with a [`SystemClock`] for
/// headless runs.
///
/// [`SystemClock`]: crate::engine::clock::SystemClock
pub struct RecordingBackend {
    clock: Arc<dyn Clock>,
    ready: bool,
    next_emitter: u64,
    calls: Vec<BackendCall>,
    emitters: HashMap<EmitterId, RecordedEmitter>,
    failures: HashMap<FailingCall, u32>,
}

impl RecordingBackend {
    /// Backend driven by a shared manual clock.
    pub fn new(clock: ManualClock) -> Self {
        Self::with_clock(Arc::new(clock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            ready: true,
            next_emitter: 1,
            calls: Vec::new(),
            emitters: HashMap::new(),
            failures: HashMap::new(),
        }
    }

    /// Toggle readiness to model an output that has not started yet.
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Make the next `times` calls of `call` fail with
    /// [`AudioError::CommandQueueFull`], as a saturated realtime queue would.
    /// Failed calls change nothing and are not recorded.
    pub fn fail_next(&mut self, call: FailingCall, times: u32) {
        self.failures.insert(call, times);
    }

    fn injected_failure(&mut self, call: FailingCall) -> Result<(), AudioError> {
        match self.failures.get_mut(&call) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(AudioError::CommandQueueFull)
            }
            _ => Ok(()),
        }
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Emitters created and not yet released.
    pub fn live_emitters(&self) -> usize {
        self.emitters.len()
    }

    pub fn is_live(&self, emitter: EmitterId) -> bool {
        self.emitters.contains_key(&emitter)
    }

    /// Evaluated gain of `emitter` at time `t`, if it is live.
    pub fn gain_value_at(&self, emitter: EmitterId, t: f64) -> Option<f32> {
        self.emitters
            .get(&emitter)
            .map(|recorded| recorded.gain.value_at(t))
    }

    pub fn stopped_at(&self, emitter: EmitterId) -> Option<f64> {
        self.emitters
            .get(&emitter)
            .and_then(|recorded| recorded.stopped_at)
    }

    /// Automations recorded for `emitter` on `param`, in call order.
    pub fn automations(&self, emitter: EmitterId, param: Param) -> Vec<Automation> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Automate {
                    emitter: id,
                    automation,
                } if *id == emitter && automation.param() == param => Some(*automation),
                _ => None,
            })
            .collect()
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new(ManualClock::new())
    }
}

impl AudioBackend for RecordingBackend {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn current_time(&self) -> f64 {
        self.clock.now()
    }

    fn create_emitter(&mut self, spec: EmitterSpec) -> Result<EmitterId, AudioError> {
        if !self.ready {
            return Err(AudioError::BackendNotReady);
        }
        self.injected_failure(FailingCall::Create)?;
        let emitter = EmitterId(self.next_emitter);
        self.next_emitter += 1;
        self.emitters.insert(
            emitter,
            RecordedEmitter {
                gain: AudioParam::new(spec.initial_gain),
                stopped_at: None,
            },
        );
        self.calls.push(BackendCall::Create { emitter, spec });
        Ok(emitter)
    }

    fn automate(&mut self, emitter: EmitterId, automation: Automation) -> Result<(), AudioError> {
        self.injected_failure(FailingCall::Automate)?;
        let recorded = self
            .emitters
            .get_mut(&emitter)
            .ok_or(AudioError::UnknownEmitter { emitter: emitter.0 })?;
        if automation.param() == Param::Gain {
            automation.apply_to(&mut recorded.gain);
        }
        self.calls.push(BackendCall::Automate {
            emitter,
            automation,
        });
        Ok(())
    }

    fn stop_emitter(&mut self, emitter: EmitterId, when: f64) -> Result<(), AudioError> {
        self.injected_failure(FailingCall::Stop)?;
        let recorded = self
            .emitters
            .get_mut(&emitter)
            .ok_or(AudioError::UnknownEmitter { emitter: emitter.0 })?;
        recorded.stopped_at = Some(when);
        self.calls.push(BackendCall::Stop { emitter, when });
        Ok(())
    }

    fn release_emitter(&mut self, emitter: EmitterId) -> Result<(), AudioError> {
        self.injected_failure(FailingCall::Release)?;
        self.emitters
            .remove(&emitter)
            .ok_or(AudioError::UnknownEmitter { emitter: emitter.0 })?;
        self.calls.push(BackendCall::Release { emitter });
        Ok(())
    }
}
