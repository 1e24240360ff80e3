//! SoundEngine: spatial sound state engine.
//!
//! Owns every tracked [`SpatialSound`], classifies motion on each position
//! update, and runs the per-frame tick that drives the moving/stationary beep
//! state machine. All gain and position changes are scheduled as ramps on the
//! backend clock; deferred work (end of a beep, emitter release after a fade)
//! runs from the tick on the same thread.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::{PannerSettings, SharedConfig};
use crate::engine::backend::{AudioBackend, Automation, EmitterId, EmitterSpec, Param};
use crate::engine::scheduler::{DeferredTask, Scheduler};
use crate::engine::sound::{Position, SoundSnapshot, SpatialSound};
use crate::error::{log_audio_error, AudioError, ConfigError};

/// Time constant of position ramps (seconds)
pub const POSITION_TIME_CONSTANT: f64 = 0.03;
/// Time constant of the tick's volume ramps (seconds)
pub const GAIN_TIME_CONSTANT: f64 = 0.02;
/// Beep rise time (seconds)
pub const BEEP_ATTACK: f64 = 0.010;
/// Beep fall time after the hold (seconds)
pub const BEEP_RELEASE: f64 = 0.010;
/// Delay past the beep duration before `beeping` clears; exceeds the release
pub const BEEP_CLEAR_MARGIN: f64 = 0.020;
/// Time constant of the fade-out on removal (seconds)
pub const REMOVE_TIME_CONSTANT: f64 = 0.02;
/// Fade-out time before a removed emitter is stopped and released (seconds)
pub const REMOVE_GRACE: f64 = 0.050;
/// Release attempts for a removed emitter before it is given up on
pub const MAX_RELEASE_ATTEMPTS: u32 = 5;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Event emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Backend clock in milliseconds
    pub timestamp_ms: u64,
    pub kind: EngineEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEventKind {
    SoundCreated { id: String, frequency: f32 },
    DuplicateCreate { id: String },
    MotionChanged { id: String, moving: bool },
    BeepStarted { id: String },
    BeepEnded { id: String },
    SoundRemoved { id: String },
    EmitterReleased { id: String },
    Warning { message: String },
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub created: u64,
    pub duplicates: u64,
    pub removed: u64,
    pub released: u64,
    pub beeps: u64,
    pub backend_errors: u64,
}

/// Spatial sound engine over a backend `B`.
pub struct SoundEngine<B: AudioBackend> {
    backend: B,
    config: SharedConfig,
    panner: PannerSettings,
    sounds: HashMap<String, SpatialSound>,
    scheduler: Scheduler,
    next_serial: u64,
    events_tx: broadcast::Sender<EngineEvent>,
    stats: EngineStats,
}

impl<B: AudioBackend> SoundEngine<B> {
    pub fn new(backend: B, config: SharedConfig, panner: PannerSettings) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            config,
            panner,
            sounds: HashMap::new(),
            scheduler: Scheduler::new(),
            next_serial: 1,
            events_tx,
            stats: EngineStats::default(),
        }
    }

    // ========================================================================
    // SOUND LIFECYCLE
    // ========================================================================

    /// Start tracking `id` at `position`.
    ///
    /// Returns `None` without side effects when the backend is not ready or
    /// the position is not finite. A duplicate id is not an error: the
    /// existing sound is returned unchanged.
    pub fn create(&mut self, id: &str, position: Position) -> Option<&SpatialSound> {
        if !self.backend.is_ready() {
            log::warn!("[SoundEngine] Backend not ready, ignoring create({})", id);
            return None;
        }
        if !position.is_finite() {
            log::warn!(
                "[SoundEngine] Ignoring create({}) with non-finite position {:?}",
                id,
                position
            );
            return None;
        }
        if self.sounds.contains_key(id) {
            log::warn!("[SoundEngine] Sound {} already exists", id);
            self.stats.duplicates += 1;
            self.emit(EngineEventKind::DuplicateCreate { id: id.to_string() });
            return self.sounds.get(id);
        }

        let frequency = self.config.frequency_for(id);
        let now = self.backend.current_time();
        let spec = EmitterSpec {
            frequency,
            position,
            panner: self.panner,
            initial_gain: 0.0,
        };
        let emitter = match self.backend.create_emitter(spec) {
            Ok(emitter) => emitter,
            Err(err) => {
                self.report_backend_error(&err, "SoundEngine::create");
                return None;
            }
        };

        let serial = self.next_serial;
        self.next_serial += 1;
        self.sounds.insert(
            id.to_string(),
            SpatialSound::new(id.to_string(), serial, emitter, frequency, position, now),
        );
        self.stats.created += 1;
        log::info!(
            "[SoundEngine] Created sound {} at {:?} ({} Hz)",
            id,
            position,
            frequency
        );
        self.emit(EngineEventKind::SoundCreated {
            id: id.to_string(),
            frequency,
        });
        self.sounds.get(id)
    }

    /// Apply a new sample for `id`. Returns false if `id` is not tracked.
    pub fn update_position(&mut self, id: &str, position: Position) -> bool {
        if !position.is_finite() {
            log::warn!(
                "[SoundEngine] Ignoring non-finite position {:?} for {}",
                position,
                id
            );
            return false;
        }

        let params = self.config.tick_params();
        let now = self.backend.current_time();
        let Some(sound) = self.sounds.get_mut(id) else {
            return false;
        };

        let displacement = sound.position.distance_to(&position);
        let threshold = if sound.motion {
            (params.motion_threshold - params.motion_hysteresis).max(0.0)
        } else {
            params.motion_threshold
        };
        let was_moving = sound.motion;
        let moving = displacement > threshold;

        sound.motion = moving;
        sound.position = position;
        sound.last_sample_time = now;
        if moving && !was_moving {
            sound.last_beep_time = now;
        }
        let emitter = sound.emitter;

        for (param, value) in [
            (Param::PositionX, position.x),
            (Param::PositionY, position.y),
            (Param::PositionZ, position.z),
        ] {
            let ramp = Automation::SetTarget {
                param,
                target: value as f32,
                start: now,
                time_constant: POSITION_TIME_CONSTANT,
            };
            if let Err(err) = self.backend.automate(emitter, ramp) {
                self.report_backend_error(&err, "SoundEngine::update_position");
                break;
            }
        }

        if moving != was_moving {
            log::debug!("[SoundEngine] {} moving={} (d={:.4})", id, moving, displacement);
            self.emit(EngineEventKind::MotionChanged {
                id: id.to_string(),
                moving,
            });
        }
        true
    }

    /// Per-frame pass over every tracked sound.
    ///
    /// Deferred work due at `now` runs first, so a beep that ended this frame
    /// is already cleared when the motion/beep pass looks at it.
    pub fn tick(&mut self, now: f64) {
        self.run_deferred(now);

        let params = self.config.tick_params();
        let mut due_beeps = Vec::new();
        let mut failures = Vec::new();

        for sound in self.sounds.values_mut() {
            let result = if sound.motion {
                Self::ramp_gain(&mut self.backend, sound, params.base_volume, now)
            } else if !sound.beeping {
                let result = Self::ramp_gain(&mut self.backend, sound, 0.0, now);
                if now - sound.last_beep_time > params.idle_beep_interval {
                    due_beeps.push(sound.id().to_string());
                }
                result
            } else {
                Ok(())
            };
            if let Err(err) = result {
                failures.push(err);
            }
        }

        for err in failures {
            self.report_backend_error(&err, "SoundEngine::tick");
        }

        for id in due_beeps {
            self.start_beep(&id, now);
        }
    }

    fn ramp_gain(
        backend: &mut B,
        sound: &mut SpatialSound,
        target: f32,
        now: f64,
    ) -> Result<(), AudioError> {
        if sound.gain_target == Some(target) {
            return Ok(());
        }
        // Cached only once both calls land, so a failed ramp is retried next tick
        sound.gain_target = None;
        backend.automate(
            sound.emitter,
            Automation::CancelAndHold {
                param: Param::Gain,
                at: now,
            },
        )?;
        backend.automate(
            sound.emitter,
            Automation::SetTarget {
                param: Param::Gain,
                target,
                start: now,
                time_constant: GAIN_TIME_CONSTANT,
            },
        )?;
        sound.gain_target = Some(target);
        Ok(())
    }

    /// Fire one beep pulse for `id`.
    ///
    /// No-op (returns false) when `id` is unknown, a beep is already in
    /// flight, or the sound is moving.
    pub fn trigger_beep(&mut self, id: &str) -> bool {
        let now = self.backend.current_time();
        self.start_beep(id, now)
    }

    /// Beep pulse anchored at `now`, which also becomes `last_beep_time`.
    fn start_beep(&mut self, id: &str, now: f64) -> bool {
        let params = self.config.tick_params();
        let Some(sound) = self.sounds.get_mut(id) else {
            return false;
        };
        if sound.beeping || sound.motion {
            return false;
        }

        sound.beeping = true;
        sound.gain_target = None;
        sound.last_beep_time = now;
        let emitter = sound.emitter;
        let serial = sound.serial;

        let peak = params.base_volume;
        let duration = params.beep_duration;
        let pulse = [
            Automation::CancelAndHold {
                param: Param::Gain,
                at: now,
            },
            Automation::LinearRampTo {
                param: Param::Gain,
                value: peak,
                end_time: now + BEEP_ATTACK,
            },
            Automation::LinearRampTo {
                param: Param::Gain,
                value: peak,
                end_time: now + duration,
            },
            Automation::LinearRampTo {
                param: Param::Gain,
                value: 0.0,
                end_time: now + duration + BEEP_RELEASE,
            },
        ];
        for automation in pulse {
            if let Err(err) = self.backend.automate(emitter, automation) {
                self.report_backend_error(&err, "SoundEngine::trigger_beep");
                break;
            }
        }

        self.scheduler.schedule(
            now + duration + BEEP_CLEAR_MARGIN,
            DeferredTask::ClearBeep {
                id: id.to_string(),
                serial,
            },
        );
        self.stats.beeps += 1;
        log::debug!("[SoundEngine] Beep {} at {:.3}s", id, now);
        self.emit(EngineEventKind::BeepStarted { id: id.to_string() });
        true
    }

    /// Stop tracking `id`, fading its emitter out.
    ///
    /// The id is free for a new `create` immediately; the emitter itself is
    /// stopped and released after [`REMOVE_GRACE`].
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(sound) = self.sounds.remove(id) else {
            return false;
        };
        let now = self.backend.current_time();
        let emitter = sound.emitter;

        let fade = [
            Automation::CancelAndHold {
                param: Param::Gain,
                at: now,
            },
            Automation::SetTarget {
                param: Param::Gain,
                target: 0.0,
                start: now,
                time_constant: REMOVE_TIME_CONSTANT,
            },
        ];
        for automation in fade {
            if let Err(err) = self.backend.automate(emitter, automation) {
                self.report_backend_error(&err, "SoundEngine::remove");
                break;
            }
        }

        self.scheduler.schedule(
            now + REMOVE_GRACE,
            DeferredTask::ReleaseEmitter {
                id: id.to_string(),
                emitter,
                attempt: 1,
            },
        );
        self.stats.removed += 1;
        log::info!("[SoundEngine] Removed sound {}", id);
        self.emit(EngineEventKind::SoundRemoved { id: id.to_string() });
        true
    }

    /// Remove every tracked sound.
    pub fn remove_all(&mut self) -> usize {
        let ids: Vec<String> = self.sounds.keys().cloned().collect();
        ids.iter().filter(|id| self.remove(id)).count()
    }

    fn run_deferred(&mut self, now: f64) {
        for task in self.scheduler.pop_due(now) {
            match task {
                DeferredTask::ClearBeep { id, serial } => {
                    let cleared = match self.sounds.get_mut(&id) {
                        Some(sound) if sound.serial == serial && sound.beeping => {
                            sound.beeping = false;
                            true
                        }
                        _ => false,
                    };
                    if cleared {
                        self.emit(EngineEventKind::BeepEnded { id });
                    }
                }
                DeferredTask::ReleaseEmitter {
                    id,
                    emitter,
                    attempt,
                } => self.release(id, emitter, attempt, now),
            }
        }
    }

    /// Stop and free a removed emitter, retrying after [`REMOVE_GRACE`] when
    /// the backend refuses, up to [`MAX_RELEASE_ATTEMPTS`].
    fn release(&mut self, id: String, emitter: EmitterId, attempt: u32, now: f64) {
        if let Err(err) = self.backend.stop_emitter(emitter, now) {
            self.report_backend_error(&err, "SoundEngine::release");
        }
        match self.backend.release_emitter(emitter) {
            Ok(()) => {
                self.stats.released += 1;
                log::debug!("[SoundEngine] Released emitter {:?} of {}", emitter, id);
                self.emit(EngineEventKind::EmitterReleased { id });
            }
            Err(err) => {
                self.report_backend_error(&err, "SoundEngine::release");
                if attempt < MAX_RELEASE_ATTEMPTS {
                    log::warn!(
                        "[SoundEngine] Retrying release of {:?} ({}/{})",
                        emitter,
                        attempt + 1,
                        MAX_RELEASE_ATTEMPTS
                    );
                    self.scheduler.schedule(
                        now + REMOVE_GRACE,
                        DeferredTask::ReleaseEmitter {
                            id,
                            emitter,
                            attempt: attempt + 1,
                        },
                    );
                } else {
                    log::error!(
                        "[SoundEngine] Giving up on emitter {:?} of {} after {} attempts",
                        emitter,
                        id,
                        attempt
                    );
                    self.emit(EngineEventKind::Warning {
                        message: format!("emitter of {} could not be released", id),
                    });
                }
            }
        }
    }

    // ========================================================================
    // LIVE CONFIGURATION
    // ========================================================================

    /// Parse and apply the motion threshold (meters).
    pub fn update_threshold(&self, input: &str) -> Result<f64, ConfigError> {
        self.config.update_threshold(input)
    }

    /// Parse and apply the idle beep interval (milliseconds).
    pub fn update_beep_interval(&self, input: &str) -> Result<u64, ConfigError> {
        self.config.update_beep_interval(input)
    }

    /// Parse and apply the beep duration (milliseconds).
    pub fn update_beep_duration(&self, input: &str) -> Result<u64, ConfigError> {
        self.config.update_beep_duration(input)
    }

    pub fn set_base_volume(&self, volume: f32) -> Result<(), ConfigError> {
        self.config.set_base_volume(volume)
    }

    /// Tone for `id` on its next creation.
    pub fn set_frequency(&self, id: &str, hz: f32) -> Result<(), ConfigError> {
        self.config.set_frequency(id, hz)
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn sound(&self, id: &str) -> Option<&SpatialSound> {
        self.sounds.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sounds.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sounds.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }

    /// Snapshots of every tracked sound, sorted by id.
    pub fn snapshot(&self) -> Vec<SoundSnapshot> {
        let mut snapshots: Vec<SoundSnapshot> =
            self.sounds.values().map(SpatialSound::snapshot).collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    /// Deferred tasks not yet run (beep clears, emitter releases).
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<EngineEvent> {
        self.events_tx.clone()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn now(&self) -> f64 {
        self.backend.current_time()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn emit(&self, kind: EngineEventKind) {
        let timestamp_ms = (self.backend.current_time().max(0.0) * 1000.0) as u64;
        // No subscribers is fine
        let _ = self.events_tx.send(EngineEvent { timestamp_ms, kind });
    }

    fn report_backend_error(&mut self, err: &AudioError, context: &str) {
        log_audio_error(err, context);
        self.stats.backend_errors += 1;
        self.emit(EngineEventKind::Warning {
            message: format!("{}: {}", context, err),
        });
    }
}

#[cfg(test)]
mod tests;
