//! Offline rendering of a simulated session.
//!
//! Drives the simulated feed, the session and the engine frame by frame on a
//! [`SoftwareBackend`], rendering exactly one frame's worth of audio between
//! ticks. The result is deterministic for a given configuration, which makes
//! it useful for listening tests and regression checks without a device.

use std::path::Path;

use serde::Serialize;

use crate::config::{AppConfig, SharedConfig};
use crate::engine::backend::SoftwareBackend;
use crate::engine::core::{EngineStats, SoundEngine};
use crate::feed::SimulatedFeed;
use crate::session::Session;

/// Summary of an offline render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderReport {
    pub sample_rate: u32,
    pub channels: u16,
    /// Audio frames rendered (samples per channel)
    pub audio_frames: u64,
    /// Engine ticks executed
    pub ticks: u64,
    pub duration_secs: f64,
    pub peak: f32,
    pub stats: EngineStats,
}

pub struct OfflineRender {
    pub samples: Vec<f32>,
    pub report: RenderReport,
}

/// Render `seconds` of the configured simulation.
pub fn render_simulation(config: &AppConfig, seconds: f64) -> OfflineRender {
    let output = config.output;
    let sample_rate = output.sample_rate.max(1);
    let channels = output.channels.max(1);
    let frame_rate = if output.frame_rate.is_finite() && output.frame_rate > 0.0 {
        output.frame_rate
    } else {
        60.0
    };
    let total_frames = (seconds.max(0.0) * sample_rate as f64).round() as u64;

    let backend = SoftwareBackend::new(sample_rate, channels);
    let engine = SoundEngine::new(
        backend,
        SharedConfig::new(config.engine.clone()),
        config.panner,
    );
    let mut session = Session::new(engine, false);
    let mut feed = SimulatedFeed::new(&config.simulation, frame_rate);

    log::info!(
        "[Render] Rendering {:.2}s at {} Hz, {} channels, {:.1} ticks/s",
        seconds,
        sample_rate,
        channels,
        frame_rate
    );

    let mut samples = Vec::with_capacity((total_frames * channels as u64) as usize);
    let mut rendered = 0u64;
    let mut tick = 0u64;
    while rendered < total_frames {
        let batch = feed.step();
        session.apply_batch(&batch);
        session.frame();

        tick += 1;
        let boundary = ((tick as f64 * sample_rate as f64 / frame_rate).round() as u64)
            .min(total_frames);
        let chunk = boundary.saturating_sub(rendered);
        if chunk > 0 {
            let block = session
                .engine_mut()
                .backend_mut()
                .render(chunk as usize);
            samples.extend_from_slice(&block);
            rendered += chunk;
        }
    }

    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    let report = RenderReport {
        sample_rate,
        channels,
        audio_frames: rendered,
        ticks: session.frames(),
        duration_secs: rendered as f64 / sample_rate as f64,
        peak,
        stats: session.engine().stats(),
    };
    log::info!(
        "[Render] Done: {} ticks, {} beeps, peak {:.3}",
        report.ticks,
        report.stats.beeps,
        report.peak
    );

    OfflineRender { samples, report }
}

/// Write interleaved float samples as a 32-bit float WAV file.
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()
}
