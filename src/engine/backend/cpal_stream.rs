//! CPAL-based realtime backend for desktop platforms (Linux, macOS, Windows)
//!
//! The output callback owns the [`Mixer`]. The engine thread never touches it
//! directly: every emitter operation becomes a [`BackendCommand`] pushed onto a
//! lock-free rtrb ring that the callback drains at the start of each buffer.
//! The callback also advances an atomic frame counter, which is the backend
//! clock every ramp is scheduled against.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::config::OutputConfig;
use crate::error::AudioError;

use super::{AudioBackend, Automation, BackendCommand, EmitterId, EmitterSpec, Mixer};

/// Commands the engine may queue between two audio callbacks
const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Engine-side half of the realtime output.
pub struct CpalBackend {
    commands: Producer<BackendCommand>,
    frame_counter: Arc<AtomicU64>,
    started: Arc<AtomicBool>,
    sample_rate: u32,
    next_emitter: u64,
}

/// Keeps the output stream alive. Must stay on the thread that opened it.
pub struct CpalOutput {
    stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
}

impl CpalOutput {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn pause(&self) -> Result<(), AudioError> {
        self.stream.pause().map_err(|e| AudioError::HardwareError {
            details: format!("Output pause failed: {}", e),
        })
    }
}

impl CpalBackend {
    /// Open the default output device and start streaming.
    ///
    /// `output.sample_rate` is a preference; the device default config wins
    /// when it differs.
    pub fn open(output: &OutputConfig) -> Result<(CpalBackend, CpalOutput), AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::StreamOpenFailed {
                reason: "No default output device found".to_string(),
            })?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("Failed to get default output config: {:?}", e),
            })?;

        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(AudioError::StreamOpenFailed {
                reason: "Only F32 sample format is currently supported for output".to_string(),
            });
        }

        let stream_config: cpal::StreamConfig = config.into();
        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels;
        if sample_rate != output.sample_rate {
            log::info!(
                "[CpalBackend] Device runs at {} Hz (requested {} Hz)",
                sample_rate,
                output.sample_rate
            );
        }

        let (producer, consumer) = RingBuffer::<BackendCommand>::new(COMMAND_QUEUE_CAPACITY);
        let frame_counter = Arc::new(AtomicU64::new(0));
        let started = Arc::new(AtomicBool::new(false));

        let stream = Self::build_stream(
            &device,
            &stream_config,
            consumer,
            Arc::clone(&frame_counter),
            Arc::clone(&started),
            sample_rate,
        )?;

        stream.play().map_err(|e| AudioError::HardwareError {
            details: format!("Output start failed: {}", e),
        })?;

        log::info!(
            "[CpalBackend] Output stream started: {} Hz, {} channels",
            sample_rate,
            channels
        );

        Ok((
            CpalBackend {
                commands: producer,
                frame_counter,
                started,
                sample_rate,
                next_emitter: 1,
            },
            CpalOutput {
                stream,
                sample_rate,
                channels,
            },
        ))
    }

    fn build_stream(
        device: &cpal::Device,
        stream_config: &cpal::StreamConfig,
        mut commands: Consumer<BackendCommand>,
        frame_counter: Arc<AtomicU64>,
        started: Arc<AtomicBool>,
        sample_rate: u32,
    ) -> Result<cpal::Stream, AudioError> {
        let channels_count = stream_config.channels as usize;
        let mut mixer = Mixer::new(sample_rate);

        let err_fn = |err| log::error!("[CpalBackend] Output stream error: {}", err);

        device
            .build_output_stream(
                stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    while let Ok(command) = commands.pop() {
                        mixer.apply(command);
                    }

                    mixer.render(data, channels_count);
                    frame_counter.store(mixer.frames_rendered(), Ordering::Release);
                    started.store(true, Ordering::Release);
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("{:?}", e),
            })
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter.load(Ordering::Acquire)
    }

    fn push(&mut self, command: BackendCommand) -> Result<(), AudioError> {
        self.commands
            .push(command)
            .map_err(|_| AudioError::CommandQueueFull)
    }
}

impl AudioBackend for CpalBackend {
    fn is_ready(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn current_time(&self) -> f64 {
        self.frame_counter() as f64 / self.sample_rate as f64
    }

    fn create_emitter(&mut self, spec: EmitterSpec) -> Result<EmitterId, AudioError> {
        if !self.is_ready() {
            return Err(AudioError::BackendNotReady);
        }
        let id = EmitterId(self.next_emitter);
        self.push(BackendCommand::CreateEmitter { id, spec })?;
        self.next_emitter += 1;
        Ok(id)
    }

    fn automate(&mut self, emitter: EmitterId, automation: Automation) -> Result<(), AudioError> {
        self.push(BackendCommand::Automate {
            id: emitter,
            automation,
        })
    }

    fn stop_emitter(&mut self, emitter: EmitterId, when: f64) -> Result<(), AudioError> {
        self.push(BackendCommand::Stop { id: emitter, when })
    }

    fn release_emitter(&mut self, emitter: EmitterId) -> Result<(), AudioError> {
        self.push(BackendCommand::Release { id: emitter })
    }
}
