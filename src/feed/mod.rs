//! Tag feeds: sources of `{id, x, y, z}` sample batches.
//!
//! Every feed delivers the full current batch of tracked tags per cycle (not
//! a delta) to the callback registered with [`DataFeed::on_data`]. Removal
//! detection is left to the consumer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::engine::sound::Position;
use crate::error::FeedError;

pub mod network;
pub mod payload;
pub mod simulated;

pub use network::{Connector, FeedMessage, MessageStream, NetworkFeed, WebSocketConnector};
pub use payload::{parse_payload, TagRecord};
pub use simulated::SimulatedFeed;

/// One tag sample in audio-engine coordinates (meters, y up).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSample {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl TagSample {
    pub fn new(id: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            z,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y, self.z)
    }
}

/// Callback receiving each batch.
pub type DataCallback = Arc<dyn Fn(Vec<TagSample>) + Send + Sync>;

/// Connection state reported by network feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error,
}

/// Contract shared by every feed implementation.
pub trait DataFeed: Send {
    /// Begin delivering batches. Must be called inside a Tokio runtime.
    fn start(&mut self) -> Result<(), FeedError>;

    /// Stop delivering batches. Tracked sounds are not affected.
    fn stop(&mut self);

    /// Replace the batch callback. Takes effect for the next batch.
    fn on_data(&mut self, callback: DataCallback);

    fn is_running(&self) -> bool;
}

/// Callback that forwards batches into an mpsc channel, plus its receiver.
///
/// Lets a frame loop drain batches on its own schedule. Batches are dropped
/// with a warning when the receiver is gone or the channel is full.
pub fn batch_channel(capacity: usize) -> (DataCallback, mpsc::Receiver<Vec<TagSample>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let callback: DataCallback = Arc::new(move |batch| {
        if let Err(err) = tx.try_send(batch) {
            tracing::warn!("[DataFeed] Dropping batch: {}", err);
        }
    });
    (callback, rx)
}
