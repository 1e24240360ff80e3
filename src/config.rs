//! Configuration management for runtime tuning
//!
//! This module provides configuration loading from JSON files plus the
//! live-tunable engine parameters. Engine parameters sit behind a
//! [`SharedConfig`] handle that the sound engine reads on every tick, so a
//! change made from the CLI, the debug HTTP surface or a test is picked up on
//! the next frame without any reload step.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::ConfigError;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub panner: PannerSettings,
    pub network: NetworkFeedConfig,
    pub simulation: SimulationConfig,
    pub output: OutputConfig,
}

/// Motion/beep/volume parameters read by the engine on every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Displacement between consecutive samples (meters) above which a tag is moving
    pub motion_threshold: f64,
    /// Release band below the threshold for an already-moving tag (0 = single-sample flip)
    pub motion_hysteresis: f64,
    /// Time between idle beeps while stationary
    pub idle_beep_interval_ms: u64,
    /// Pulse-up plus hold time of one beep
    pub beep_duration_ms: u64,
    /// Gain while moving or mid-beep
    pub base_volume: f32,
    /// Tone per tag id
    pub frequencies: FrequencyTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            motion_threshold: 0.02,
            motion_hysteresis: 0.0,
            idle_beep_interval_ms: 3000,
            beep_duration_ms: 100,
            base_volume: 1.0,
            frequencies: FrequencyTable::default(),
        }
    }
}

impl EngineConfig {
    pub fn tick_params(&self) -> TickParams {
        TickParams {
            motion_threshold: self.motion_threshold,
            motion_hysteresis: self.motion_hysteresis,
            idle_beep_interval: self.idle_beep_interval_ms as f64 / 1000.0,
            beep_duration: self.beep_duration_ms as f64 / 1000.0,
            base_volume: self.base_volume,
        }
    }
}

/// Copy of the scalar engine parameters in engine clock units (seconds)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickParams {
    pub motion_threshold: f64,
    pub motion_hysteresis: f64,
    pub idle_beep_interval: f64,
    pub beep_duration: f64,
    pub base_volume: f32,
}

/// Tag id → tone frequency mapping with a fallback entry
///
/// Serialized flat, e.g. `{"0": 261.63, "1": 293.66, "default": 100.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyTable {
    #[serde(default = "FrequencyTable::default_frequency")]
    pub default: f32,
    #[serde(flatten)]
    pub entries: BTreeMap<String, f32>,
}

impl FrequencyTable {
    fn default_frequency() -> f32 {
        100.0
    }

    /// Frequency for `id`, falling back to the `default` entry
    pub fn lookup(&self, id: &str) -> f32 {
        self.entries.get(id).copied().unwrap_or(self.default)
    }
}

impl Default for FrequencyTable {
    fn default() -> Self {
        // C major scale from C4 for the first six tag ids
        let entries = [
            ("0", 261.63),
            ("1", 293.66),
            ("2", 329.63),
            ("3", 349.23),
            ("4", 392.00),
            ("5", 440.00),
        ]
        .into_iter()
        .map(|(id, hz)| (id.to_string(), hz))
        .collect();

        Self {
            default: Self::default_frequency(),
            entries,
        }
    }
}

/// Distance attenuation law applied by the backend panner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceModel {
    Inverse,
    Exponential,
    Linear,
}

/// Positional emitter parameters passed through to the backend unchanged
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PannerSettings {
    pub distance_model: DistanceModel,
    pub ref_distance: f64,
    pub max_distance: f64,
    pub rolloff_factor: f64,
}

impl Default for PannerSettings {
    fn default() -> Self {
        Self {
            distance_model: DistanceModel::Inverse,
            ref_distance: 1.0,
            max_distance: 100.0,
            rolloff_factor: 1.0,
        }
    }
}

/// Network tag feed settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkFeedConfig {
    /// Message endpoint
    pub url: String,
    /// Fixed delay before each reconnect attempt
    pub reconnect_interval_ms: u64,
    /// Sensor units → audio meters for the horizontal/vertical axes
    pub scale_factor: f64,
}

impl Default for NetworkFeedConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8765".to_string(),
            reconnect_interval_ms: 3000,
            scale_factor: 5.0,
        }
    }
}

/// One synthetic orbiting object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedObjectConfig {
    pub id: String,
    /// Starting phase in radians
    #[serde(default)]
    pub phase: f64,
    /// Phase advance per frame in radians
    pub speed: f64,
    /// Orbit radius in simulation units
    #[serde(default = "SimulatedObjectConfig::default_radius")]
    pub radius: f64,
}

impl SimulatedObjectConfig {
    fn default_radius() -> f64 {
        3.0
    }
}

/// Simulated tag feed settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub objects: Vec<SimulatedObjectConfig>,
    pub scale_factor: f64,
    /// Uniform noise amplitude added to every coordinate (0 disables)
    pub jitter: f64,
    /// Seed for the jitter generator
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            objects: vec![SimulatedObjectConfig {
                id: "obj1".to_string(),
                phase: 0.0,
                speed: 0.02,
                radius: SimulatedObjectConfig::default_radius(),
            }],
            scale_factor: 1.0,
            jitter: 0.0,
            seed: 42,
        }
    }
}

/// Output and frame-clock settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Engine ticks per second
    pub frame_rate: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            frame_rate: 60.0,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or the defaults if the file doesn't exist
    /// or the JSON is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset location
    pub fn load() -> Self {
        Self::load_from_file("assets/visionr_config.json")
    }
}

/// Partial update of the live engine parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamPatch {
    #[serde(default)]
    pub motion_threshold: Option<f64>,
    #[serde(default)]
    pub motion_hysteresis: Option<f64>,
    #[serde(default)]
    pub idle_beep_interval_ms: Option<u64>,
    #[serde(default)]
    pub beep_duration_ms: Option<u64>,
    #[serde(default)]
    pub base_volume: Option<f32>,
}

impl ParamPatch {
    pub fn is_empty(&self) -> bool {
        self.motion_threshold.is_none()
            && self.motion_hysteresis.is_none()
            && self.idle_beep_interval_ms.is_none()
            && self.beep_duration_ms.is_none()
            && self.base_volume.is_none()
    }
}

const MAX_DISTANCE_M: f64 = 100.0;
const MAX_INTERVAL_MS: f64 = 600_000.0;
const MAX_BEEP_MS: f64 = 60_000.0;
const MIN_FREQUENCY_HZ: f64 = 1.0;
const MAX_FREQUENCY_HZ: f64 = 24_000.0;

/// Live-tunable engine configuration shared between the engine and its
/// control surfaces
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<EngineConfig>>,
}

impl SharedConfig {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Clone of the current configuration
    pub fn snapshot(&self) -> EngineConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Scalar parameters for one engine pass
    pub fn tick_params(&self) -> TickParams {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tick_params()
    }

    pub fn frequency_for(&self, id: &str) -> f32 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .frequencies
            .lookup(id)
    }

    fn write<T>(&self, apply: impl FnOnce(&mut EngineConfig) -> T) -> Result<T, ConfigError> {
        let mut guard = self.inner.write().map_err(|_| ConfigError::LockPoisoned)?;
        Ok(apply(&mut guard))
    }

    /// Parse and apply a motion threshold in meters
    pub fn update_threshold(&self, input: &str) -> Result<f64, ConfigError> {
        let value = parse_number("motion_threshold", input)?;
        self.set_motion_threshold(value)?;
        Ok(value)
    }

    /// Parse and apply an idle beep interval in milliseconds
    pub fn update_beep_interval(&self, input: &str) -> Result<u64, ConfigError> {
        let value = parse_number("idle_beep_interval_ms", input)?;
        let ms = ensure_range("idle_beep_interval_ms", value, 0.0, MAX_INTERVAL_MS)? as u64;
        self.write(|config| config.idle_beep_interval_ms = ms)?;
        log::info!("[Config] idle_beep_interval_ms = {}", ms);
        Ok(ms)
    }

    /// Parse and apply a beep duration in milliseconds
    pub fn update_beep_duration(&self, input: &str) -> Result<u64, ConfigError> {
        let value = parse_number("beep_duration_ms", input)?;
        let ms = ensure_range("beep_duration_ms", value, 0.0, MAX_BEEP_MS)? as u64;
        self.write(|config| config.beep_duration_ms = ms)?;
        log::info!("[Config] beep_duration_ms = {}", ms);
        Ok(ms)
    }

    pub fn set_motion_threshold(&self, meters: f64) -> Result<(), ConfigError> {
        let meters = ensure_range("motion_threshold", meters, 0.0, MAX_DISTANCE_M)?;
        self.write(|config| config.motion_threshold = meters)?;
        log::info!("[Config] motion_threshold = {}", meters);
        Ok(())
    }

    pub fn set_base_volume(&self, volume: f32) -> Result<(), ConfigError> {
        let volume = ensure_range("base_volume", volume as f64, 0.0, 1.0)? as f32;
        self.write(|config| config.base_volume = volume)?;
        log::info!("[Config] base_volume = {}", volume);
        Ok(())
    }

    /// Set the tone for one tag id (or `"default"` for the fallback)
    ///
    /// Applies to sounds created afterwards.
    pub fn set_frequency(&self, id: &str, hz: f32) -> Result<(), ConfigError> {
        let hz = ensure_range("frequency", hz as f64, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ)? as f32;
        self.write(|config| {
            if id == "default" {
                config.frequencies.default = hz;
            } else {
                config.frequencies.entries.insert(id.to_string(), hz);
            }
        })
    }

    /// Validate every field of `patch`, then apply them together
    pub fn apply_patch(&self, patch: &ParamPatch) -> Result<EngineConfig, ConfigError> {
        if patch.is_empty() {
            return Err(ConfigError::EmptyPatch);
        }

        let threshold = patch
            .motion_threshold
            .map(|v| ensure_range("motion_threshold", v, 0.0, MAX_DISTANCE_M))
            .transpose()?;
        let hysteresis = patch
            .motion_hysteresis
            .map(|v| ensure_range("motion_hysteresis", v, 0.0, MAX_DISTANCE_M))
            .transpose()?;
        let interval = patch
            .idle_beep_interval_ms
            .map(|v| ensure_range("idle_beep_interval_ms", v as f64, 0.0, MAX_INTERVAL_MS))
            .transpose()?;
        let duration = patch
            .beep_duration_ms
            .map(|v| ensure_range("beep_duration_ms", v as f64, 0.0, MAX_BEEP_MS))
            .transpose()?;
        let volume = patch
            .base_volume
            .map(|v| ensure_range("base_volume", v as f64, 0.0, 1.0))
            .transpose()?;

        let updated = self.write(|config| {
            if let Some(v) = threshold {
                config.motion_threshold = v;
            }
            if let Some(v) = hysteresis {
                config.motion_hysteresis = v;
            }
            if let Some(v) = interval {
                config.idle_beep_interval_ms = v as u64;
            }
            if let Some(v) = duration {
                config.beep_duration_ms = v as u64;
            }
            if let Some(v) = volume {
                config.base_volume = v as f32;
            }
            config.clone()
        })?;

        log::info!("[Config] Applied patch {:?}", patch);
        Ok(updated)
    }
}

fn parse_number(field: &'static str, input: &str) -> Result<f64, ConfigError> {
    input
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ConfigError::NotANumber {
            field,
            input: input.to_string(),
        })
}

fn ensure_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<f64, ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotANumber {
            field,
            input: value.to_string(),
        });
    }
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.engine.motion_threshold, 0.02);
        assert_eq!(config.engine.idle_beep_interval_ms, 3000);
        assert_eq!(config.engine.beep_duration_ms, 100);
        assert_eq!(config.network.reconnect_interval_ms, 3000);
        assert_eq!(config.panner.distance_model, DistanceModel::Inverse);
    }

    #[test]
    fn test_frequency_lookup_falls_back_to_default() {
        let table = FrequencyTable::default();
        assert_eq!(table.lookup("5"), 440.0);
        assert_eq!(table.lookup("obj1"), 100.0);
    }

    #[test]
    fn test_frequency_table_flat_json() {
        let table: FrequencyTable =
            serde_json::from_str(r#"{"7": 523.25, "default": 220.0}"#).unwrap();
        assert_eq!(table.lookup("7"), 523.25);
        assert_eq!(table.lookup("8"), 220.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"engine": {"motion_threshold": 0.05}}"#).unwrap();
        assert_eq!(config.engine.motion_threshold, 0.05);
        assert_eq!(config.engine.beep_duration_ms, 100);
        assert_eq!(config.output.sample_rate, 48_000);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load_from_file("/definitely/not/here.json");
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_textual_setters_reject_nan() {
        let shared = SharedConfig::default();
        assert!(matches!(
            shared.update_threshold("abc"),
            Err(ConfigError::NotANumber { .. })
        ));
        assert!(matches!(
            shared.update_threshold("NaN"),
            Err(ConfigError::NotANumber { .. })
        ));
        assert!(matches!(
            shared.update_beep_interval("-5"),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert_eq!(shared.snapshot(), EngineConfig::default());
    }

    #[test]
    fn test_textual_setters_apply() {
        let shared = SharedConfig::default();
        assert_eq!(shared.update_threshold(" 0.05 ").unwrap(), 0.05);
        assert_eq!(shared.update_beep_interval("1500").unwrap(), 1500);
        assert_eq!(shared.update_beep_duration("250.9").unwrap(), 250);

        let params = shared.tick_params();
        assert_eq!(params.motion_threshold, 0.05);
        assert!((params.idle_beep_interval - 1.5).abs() < 1e-9);
        assert!((params.beep_duration - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_patch_is_all_or_nothing() {
        let shared = SharedConfig::default();
        let patch = ParamPatch {
            motion_threshold: Some(0.1),
            base_volume: Some(4.0),
            ..ParamPatch::default()
        };
        assert!(shared.apply_patch(&patch).is_err());
        assert_eq!(shared.snapshot().motion_threshold, 0.02);

        let patch = ParamPatch {
            motion_threshold: Some(0.1),
            base_volume: Some(0.5),
            ..ParamPatch::default()
        };
        let updated = shared.apply_patch(&patch).unwrap();
        assert_eq!(updated.motion_threshold, 0.1);
        assert_eq!(updated.base_volume, 0.5);
    }

    #[test]
    fn test_empty_patch_rejected() {
        let shared = SharedConfig::default();
        assert_eq!(
            shared.apply_patch(&ParamPatch::default()),
            Err(ConfigError::EmptyPatch)
        );
    }

    #[test]
    fn test_set_frequency_default_entry() {
        let shared = SharedConfig::default();
        shared.set_frequency("default", 150.0).unwrap();
        shared.set_frequency("9", 880.0).unwrap();
        assert_eq!(shared.frequency_for("unknown"), 150.0);
        assert_eq!(shared.frequency_for("9"), 880.0);
        assert!(shared.set_frequency("9", 0.0).is_err());
    }
}
