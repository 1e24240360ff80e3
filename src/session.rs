//! Session: wires a tag feed to the sound engine.
//!
//! Applies each batch to the engine (creating sounds on first sight,
//! updating known ones, and optionally removing ids missing from the batch),
//! forwards the batch to observers such as the projector, and runs the frame
//! loop. Batches that arrived since the previous frame are always applied
//! before that frame's tick.

use std::collections::HashSet;

use tokio::sync::{mpsc, watch};

use crate::engine::backend::AudioBackend;
use crate::engine::clock::FrameTicker;
use crate::engine::core::SoundEngine;
use crate::engine::sound::SoundSnapshot;
use crate::feed::TagSample;

/// Consumer of every batch, called after the engine has seen it.
pub trait BatchObserver: Send {
    fn observe(&mut self, batch: &[TagSample]);
}

/// What one batch did to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

pub struct Session<B: AudioBackend> {
    engine: SoundEngine<B>,
    remove_missing: bool,
    observers: Vec<Box<dyn BatchObserver>>,
    snapshot_tx: watch::Sender<Vec<SoundSnapshot>>,
    frames: u64,
}

impl<B: AudioBackend> Session<B> {
    /// `remove_missing` removes tracked ids absent from a batch; use it for
    /// feeds whose batches list every visible tag.
    pub fn new(engine: SoundEngine<B>, remove_missing: bool) -> Self {
        let (snapshot_tx, _) = watch::channel(Vec::new());
        Self {
            engine,
            remove_missing,
            observers: Vec::new(),
            snapshot_tx,
            frames: 0,
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn BatchObserver>) {
        self.observers.push(observer);
    }

    pub fn apply_batch(&mut self, batch: &[TagSample]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for sample in batch {
            let position = sample.position();
            if self.engine.contains(&sample.id) {
                if self.engine.update_position(&sample.id, position) {
                    outcome.updated += 1;
                }
            } else if self.engine.create(&sample.id, position).is_some() {
                outcome.created += 1;
            }
        }

        if self.remove_missing {
            let active: HashSet<&str> = batch.iter().map(|sample| sample.id.as_str()).collect();
            let missing: Vec<String> = self
                .engine
                .ids()
                .filter(|id| !active.contains(id))
                .map(str::to_string)
                .collect();
            for id in missing {
                log::info!("[Session] Tag {} no longer detected, removing sound", id);
                if self.engine.remove(&id) {
                    outcome.removed += 1;
                }
            }
        }

        for observer in &mut self.observers {
            observer.observe(batch);
        }

        if outcome.created > 0 || outcome.removed > 0 {
            log::debug!(
                "[Session] Batch: {} created, {} updated, {} removed",
                outcome.created,
                outcome.updated,
                outcome.removed
            );
        }
        outcome
    }

    /// Tick the engine at the backend's current time and publish a snapshot.
    pub fn frame(&mut self) {
        let now = self.engine.now();
        self.frame_at(now);
    }

    pub fn frame_at(&mut self, now: f64) {
        self.engine.tick(now);
        self.frames += 1;
        self.snapshot_tx.send_replace(self.engine.snapshot());
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<Vec<SoundSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn engine(&self) -> &SoundEngine<B> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SoundEngine<B> {
        &mut self.engine
    }

    /// Frame loop: drain pending batches, then tick, once per frame.
    ///
    /// Returns when `shutdown` flips (or its sender is dropped). Stopping the
    /// loop leaves tracked sounds in place.
    pub async fn run(
        &mut self,
        batches: &mut mpsc::Receiver<Vec<TagSample>>,
        ticker: &mut FrameTicker,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        tracing::info!(
            "[Session] Frame loop started ({:.1} ms/frame)",
            ticker.period().as_secs_f64() * 1000.0
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    while let Ok(batch) = batches.try_recv() {
                        self.apply_batch(&batch);
                    }
                    self.frame();
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("[Session] Frame loop stopped after {} frames", self.frames);
    }
}
