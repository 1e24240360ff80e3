use crate::error::AudioError;

use super::{AudioBackend, Automation, BackendCommand, EmitterId, EmitterSpec, Mixer};

const SCRATCH_FRAMES: usize = 1024;

/// Offline backend: the clock advances only as audio is rendered.
pub struct SoftwareBackend {
    mixer: Mixer,
    channels: usize,
    next_emitter: u64,
}

impl SoftwareBackend {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            mixer: Mixer::new(sample_rate),
            channels: channels.max(1) as usize,
            next_emitter: 1,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.mixer.sample_rate()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn voice_count(&self) -> usize {
        self.mixer.voice_count()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.mixer.frames_rendered()
    }

    /// Render and discard audio until the clock reaches `seconds`.
    ///
    /// Paces the backend against wall time when no device is attached.
    /// Returns the number of frames rendered.
    pub fn advance_to(&mut self, seconds: f64) -> u64 {
        let target = (seconds.max(0.0) * self.sample_rate() as f64) as u64;
        let behind = target.saturating_sub(self.frames_rendered());
        let mut remaining = behind;
        let mut scratch = vec![0.0f32; SCRATCH_FRAMES * self.channels];
        while remaining > 0 {
            let frames = remaining.min(SCRATCH_FRAMES as u64) as usize;
            self.mixer
                .render(&mut scratch[..frames * self.channels], self.channels);
            remaining -= frames as u64;
        }
        behind
    }

    /// Render `frames` interleaved frames, advancing the clock.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames * self.channels];
        self.mixer.render(&mut out, self.channels);
        out
    }

    fn send(&mut self, command: BackendCommand, emitter: EmitterId) -> Result<(), AudioError> {
        if self.mixer.apply(command) {
            Ok(())
        } else {
            Err(AudioError::UnknownEmitter { emitter: emitter.0 })
        }
    }
}

impl AudioBackend for SoftwareBackend {
    fn is_ready(&self) -> bool {
        true
    }

    fn current_time(&self) -> f64 {
        self.mixer.current_time()
    }

    fn create_emitter(&mut self, spec: EmitterSpec) -> Result<EmitterId, AudioError> {
        let id = EmitterId(self.next_emitter);
        self.next_emitter += 1;
        self.send(BackendCommand::CreateEmitter { id, spec }, id)?;
        Ok(id)
    }

    fn automate(&mut self, emitter: EmitterId, automation: Automation) -> Result<(), AudioError> {
        self.send(
            BackendCommand::Automate {
                id: emitter,
                automation,
            },
            emitter,
        )
    }

    fn stop_emitter(&mut self, emitter: EmitterId, when: f64) -> Result<(), AudioError> {
        self.send(BackendCommand::Stop { id: emitter, when }, emitter)
    }

    fn release_emitter(&mut self, emitter: EmitterId) -> Result<(), AudioError> {
        self.send(BackendCommand::Release { id: emitter }, emitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PannerSettings;
    use crate::engine::backend::Param;
    use crate::engine::sound::Position;

    #[test]
    fn test_clock_follows_rendered_frames() {
        let mut backend = SoftwareBackend::new(48_000, 2);
        assert_eq!(backend.current_time(), 0.0);
        let out = backend.render(4_800);
        assert_eq!(out.len(), 9_600);
        assert!((backend.current_time() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_advance_to_catches_up_once() {
        let mut backend = SoftwareBackend::new(8_000, 2);
        assert_eq!(backend.advance_to(0.5), 4_000);
        assert_eq!(backend.frames_rendered(), 4_000);
        assert_eq!(backend.advance_to(0.25), 0);
        assert!((backend.current_time() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_emitter_lifecycle() {
        let mut backend = SoftwareBackend::new(8_000, 1);
        let emitter = backend
            .create_emitter(EmitterSpec {
                frequency: 440.0,
                position: Position::new(0.0, 0.0, -1.0),
                panner: PannerSettings::default(),
                initial_gain: 0.0,
            })
            .unwrap();
        backend
            .automate(
                emitter,
                Automation::SetTarget {
                    param: Param::Gain,
                    target: 1.0,
                    start: 0.0,
                    time_constant: 0.02,
                },
            )
            .unwrap();
        let out = backend.render(800);
        assert!(out.iter().any(|s| s.abs() > 0.1));

        backend.release_emitter(emitter).unwrap();
        assert_eq!(backend.voice_count(), 0);
        assert_eq!(
            backend.release_emitter(emitter),
            Err(AudioError::UnknownEmitter { emitter: emitter.0 })
        );
    }
}
