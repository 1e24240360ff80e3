//! SimulatedFeed: deterministic orbiting objects for demos and tests.
//!
//! Each object advances its phase by `speed` radians per frame and sits at
//! `x = sin(phase) * r`, `y = sin(phase) * r`, `z = cos(phase) * r`, scaled by
//! the feed's scale factor. Optional seeded jitter models sensor noise.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::{SimulatedObjectConfig, SimulationConfig};
use crate::error::FeedError;

use super::{DataCallback, DataFeed, TagSample};

#[derive(Debug, Clone)]
struct SimulatedObject {
    id: String,
    phase: f64,
    speed: f64,
    radius: f64,
}

impl From<&SimulatedObjectConfig> for SimulatedObject {
    fn from(config: &SimulatedObjectConfig) -> Self {
        Self {
            id: config.id.clone(),
            phase: config.phase,
            speed: config.speed,
            radius: config.radius,
        }
    }
}

struct Orbit {
    objects: Vec<SimulatedObject>,
    scale_factor: f64,
    jitter: f64,
    rng: StdRng,
}

impl Orbit {
    fn step(&mut self) -> Vec<TagSample> {
        let scale = self.scale_factor;
        let jitter = self.jitter;
        let rng = &mut self.rng;
        self.objects
            .iter_mut()
            .map(|obj| {
                obj.phase += obj.speed;
                let (sin, cos) = obj.phase.sin_cos();
                let mut noise = || {
                    if jitter > 0.0 {
                        rng.gen_range(-jitter..=jitter)
                    } else {
                        0.0
                    }
                };
                TagSample {
                    id: obj.id.clone(),
                    x: (sin * obj.radius + noise()) * scale,
                    y: (sin * obj.radius + noise()) * scale,
                    z: (cos * obj.radius + noise()) * scale,
                }
            })
            .collect()
    }
}

/// Synthetic feed emitting one batch per frame.
pub struct SimulatedFeed {
    orbit: Arc<Mutex<Orbit>>,
    frame_period: Duration,
    callback: Arc<RwLock<Option<DataCallback>>>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl SimulatedFeed {
    pub fn new(config: &SimulationConfig, frame_rate: f64) -> Self {
        let rate = if frame_rate.is_finite() && frame_rate > 0.0 {
            frame_rate
        } else {
            60.0
        };
        let orbit = Orbit {
            objects: config.objects.iter().map(SimulatedObject::from).collect(),
            scale_factor: config.scale_factor,
            jitter: config.jitter.max(0.0),
            rng: StdRng::seed_from_u64(config.seed),
        };
        Self {
            orbit: Arc::new(Mutex::new(orbit)),
            frame_period: Duration::from_secs_f64(1.0 / rate),
            callback: Arc::new(RwLock::new(None)),
            shutdown: None,
            task: None,
        }
    }

    /// Advance one frame and return the batch without invoking the callback.
    ///
    /// Used by the offline renderer, which drives frames itself.
    pub fn step(&mut self) -> Vec<TagSample> {
        Self::advance(&self.orbit)
    }

    fn advance(orbit: &Mutex<Orbit>) -> Vec<TagSample> {
        orbit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .step()
    }

    fn deliver(callback: &RwLock<Option<DataCallback>>, batch: Vec<TagSample>) {
        let callback = callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(batch);
        }
    }
}

impl DataFeed for SimulatedFeed {
    fn start(&mut self) -> Result<(), FeedError> {
        if self.is_running() {
            return Err(FeedError::AlreadyRunning);
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| FeedError::NoRuntime)?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let orbit = Arc::clone(&self.orbit);
        let callback = Arc::clone(&self.callback);
        let period = self.frame_period;

        let task = handle.spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let batch = Self::advance(&orbit);
                        Self::deliver(&callback, batch);
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::debug!("[SimulatedFeed] Worker stopped");
        });

        tracing::info!(
            "[SimulatedFeed] Started ({:.1} Hz)",
            1.0 / period.as_secs_f64()
        );
        self.shutdown = Some(shutdown_tx);
        self.task = Some(task);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn on_data(&mut self, callback: DataCallback) {
        *self
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SimulatedFeed {
    fn drop(&mut self) {
        self.stop();
    }
}
