// Mixer - renders emitters to an interleaved output buffer
//
// Each voice is a sine oscillator whose gain, frequency and position are
// AudioParam timelines. Spatialization is a distance-attenuation law plus
// equal-power stereo panning for a listener at the origin facing -Z.
//
// The mixer is owned by exactly one thread: the offline renderer, or the
// realtime output callback (fed through an rtrb command ring).

use std::f64::consts::{FRAC_PI_4, TAU};

use crate::config::{DistanceModel, PannerSettings};

use super::{AudioParam, BackendCommand, EmitterId, EmitterSpec, Param};

/// Voices pre-allocated so the realtime path does not grow the vector
const VOICE_CAPACITY: usize = 64;

/// Headroom applied to the summed output
const MASTER_GAIN: f32 = 0.5;

/// Gain factor for a source `distance` meters from the listener.
pub fn distance_gain(panner: &PannerSettings, distance: f64) -> f64 {
    let reference = panner.ref_distance.max(f64::EPSILON);
    let rolloff = panner.rolloff_factor.max(0.0);
    match panner.distance_model {
        DistanceModel::Inverse => {
            let d = distance.max(reference);
            reference / (reference + rolloff * (d - reference))
        }
        DistanceModel::Exponential => {
            let d = distance.max(reference);
            (d / reference).powf(-rolloff)
        }
        DistanceModel::Linear => {
            let span = panner.max_distance - reference;
            if span <= 0.0 {
                return 1.0;
            }
            let d = distance.clamp(reference, panner.max_distance);
            (1.0 - rolloff * (d - reference) / span).clamp(0.0, 1.0)
        }
    }
}

/// Left/right gains for a source at (x, z) relative to the listener.
pub fn equal_power_pan(x: f64, z: f64) -> (f32, f32) {
    let horizontal = (x * x + z * z).sqrt();
    let pan = if horizontal > f64::EPSILON {
        (x / horizontal).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let angle = (pan + 1.0) * FRAC_PI_4;
    (angle.cos() as f32, angle.sin() as f32)
}

struct Voice {
    id: EmitterId,
    panner: PannerSettings,
    phase: f64,
    stop_at: Option<f64>,
    gain: AudioParam,
    frequency: AudioParam,
    x: AudioParam,
    y: AudioParam,
    z: AudioParam,
}

impl Voice {
    fn new(id: EmitterId, spec: &EmitterSpec) -> Self {
        Self {
            id,
            panner: spec.panner,
            phase: 0.0,
            stop_at: None,
            gain: AudioParam::new(spec.initial_gain),
            frequency: AudioParam::new(spec.frequency),
            x: AudioParam::new(spec.position.x as f32),
            y: AudioParam::new(spec.position.y as f32),
            z: AudioParam::new(spec.position.z as f32),
        }
    }

    fn param_mut(&mut self, param: Param) -> &mut AudioParam {
        match param {
            Param::Gain => &mut self.gain,
            Param::Frequency => &mut self.frequency,
            Param::PositionX => &mut self.x,
            Param::PositionY => &mut self.y,
            Param::PositionZ => &mut self.z,
        }
    }

    fn prune(&mut self, t: f64) {
        self.gain.prune(t);
        self.frequency.prune(t);
        self.x.prune(t);
        self.y.prune(t);
        self.z.prune(t);
    }
}

/// Software mixer for all live emitters
pub struct Mixer {
    sample_rate: u32,
    voices: Vec<Voice>,
    frames_rendered: u64,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            voices: Vec::with_capacity(VOICE_CAPACITY),
            frames_rendered: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Mixer clock in seconds (frames rendered so far)
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn contains(&self, id: EmitterId) -> bool {
        self.voices.iter().any(|voice| voice.id == id)
    }

    /// Apply one command. Returns false if it referenced an unknown emitter.
    pub fn apply(&mut self, command: BackendCommand) -> bool {
        match command {
            BackendCommand::CreateEmitter { id, spec } => {
                self.voices.push(Voice::new(id, &spec));
                true
            }
            BackendCommand::Automate { id, automation } => match self.voice_mut(id) {
                Some(voice) => {
                    automation.apply_to(voice.param_mut(automation.param()));
                    true
                }
                None => false,
            },
            BackendCommand::Stop { id, when } => match self.voice_mut(id) {
                Some(voice) => {
                    voice.stop_at = Some(when);
                    true
                }
                None => false,
            },
            BackendCommand::Release { id } => {
                let before = self.voices.len();
                self.voices.retain(|voice| voice.id != id);
                self.voices.len() != before
            }
        }
    }

    fn voice_mut(&mut self, id: EmitterId) -> Option<&mut Voice> {
        self.voices.iter_mut().find(|voice| voice.id == id)
    }

    /// Render `out.len() / channels` frames of interleaved audio.
    ///
    /// Mono output gets the unpanned sum; channels beyond two are left silent.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        out.iter_mut().for_each(|sample| *sample = 0.0);
        if channels == 0 {
            return;
        }

        let sample_rate = self.sample_rate as f64;
        let block_start = self.current_time();
        for voice in &mut self.voices {
            voice.prune(block_start);
        }

        let frame_count = out.len() / channels;
        for (i, frame) in out.chunks_mut(channels).take(frame_count).enumerate() {
            let t = (self.frames_rendered + i as u64) as f64 / sample_rate;
            let mut left = 0.0f32;
            let mut right = 0.0f32;

            for voice in &mut self.voices {
                if voice.stop_at.is_some_and(|stop| t >= stop) {
                    continue;
                }

                let frequency = voice.frequency.value_at(t) as f64;
                voice.phase = (voice.phase + TAU * frequency / sample_rate) % TAU;

                let gain = voice.gain.value_at(t);
                if gain <= 0.0 {
                    continue;
                }

                let x = voice.x.value_at(t) as f64;
                let y = voice.y.value_at(t) as f64;
                let z = voice.z.value_at(t) as f64;
                let distance = (x * x + y * y + z * z).sqrt();
                let attenuation = distance_gain(&voice.panner, distance) as f32;
                let sample = voice.phase.sin() as f32 * gain * attenuation;

                let (pan_l, pan_r) = equal_power_pan(x, z);
                left += sample * pan_l;
                right += sample * pan_r;
            }

            if channels == 1 {
                frame[0] = (left + right) * MASTER_GAIN;
            } else {
                frame[0] = left * MASTER_GAIN;
                frame[1] = right * MASTER_GAIN;
            }
        }

        self.frames_rendered += frame_count as u64;
    }
}
