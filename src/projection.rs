//! 2D projection of tag batches for display.
//!
//! Front-facing view: 12 world units span the viewport width, x grows right,
//! y grows up (screen y is inverted), and nearer tags get larger markers.
//! The projector is fed the same batches as the engine and never feeds back.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::feed::TagSample;
use crate::session::BatchObserver;

/// World units visible across the viewport width
const WORLD_WIDTH: f64 = 12.0;
const MIN_RADIUS: f64 = 5.0;
const RADIUS_SCALE: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 400.0,
        }
    }
}

/// Projected marker for one tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    /// Stable color hue in degrees, derived from the id
    pub hue: u16,
}

/// 31-multiplier string hash over UTF-16 code units, wrapping at 32 bits.
pub fn id_hash(id: &str) -> i32 {
    id.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

pub fn id_hue(id: &str) -> u16 {
    (id_hash(id) % 360).unsigned_abs() as u16
}

pub struct Projector {
    viewport: Viewport,
    latest_tx: watch::Sender<Vec<ScreenPoint>>,
}

impl Projector {
    pub fn new(viewport: Viewport) -> Self {
        let (latest_tx, _) = watch::channel(Vec::new());
        Self {
            viewport,
            latest_tx,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn project(&self, sample: &TagSample) -> ScreenPoint {
        let Viewport { width, height } = self.viewport;
        let scale = width / WORLD_WIDTH;
        let distance = sample.z.abs();
        ScreenPoint {
            id: sample.id.clone(),
            x: width / 2.0 + sample.x * scale,
            y: height / 2.0 - sample.y * scale,
            radius: MIN_RADIUS.max(RADIUS_SCALE / (distance / 2.0).max(0.5)),
            hue: id_hue(&sample.id),
        }
    }

    pub fn project_batch(&self, batch: &[TagSample]) -> Vec<ScreenPoint> {
        batch.iter().map(|sample| self.project(sample)).collect()
    }

    /// Receiver of the most recently projected frame.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ScreenPoint>> {
        self.latest_tx.subscribe()
    }
}

impl BatchObserver for Projector {
    fn observe(&mut self, batch: &[TagSample]) {
        let frame = self.project_batch(batch);
        self.latest_tx.send_replace(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_and_axes() {
        let projector = Projector::new(Viewport {
            width: 1200.0,
            height: 600.0,
        });
        let origin = projector.project(&TagSample::new("a", 0.0, 0.0, -2.0));
        assert_eq!((origin.x, origin.y), (600.0, 300.0));

        let up_right = projector.project(&TagSample::new("a", 1.0, 1.0, -2.0));
        assert_eq!(up_right.x, 700.0);
        assert_eq!(up_right.y, 200.0);
    }

    #[test]
    fn test_radius_by_depth() {
        let projector = Projector::new(Viewport::default());
        assert_eq!(projector.project(&TagSample::new("a", 0.0, 0.0, -0.2)).radius, 120.0);
        assert_eq!(projector.project(&TagSample::new("a", 0.0, 0.0, -4.0)).radius, 30.0);
        assert_eq!(projector.project(&TagSample::new("a", 0.0, 0.0, 100.0)).radius, 5.0);
    }

    #[test]
    fn test_hue_is_stable() {
        assert_eq!(id_hash(""), 0);
        assert_eq!(id_hash("a"), 97);
        assert_eq!(id_hash("ab"), 97 * 31 + 98);
        assert_eq!(id_hue("obj1"), id_hue("obj1"));
        assert!(id_hue("some-long-identifier-with-overflow") < 360);
    }

    #[test]
    fn test_observer_publishes_latest_frame() {
        let mut projector = Projector::new(Viewport::default());
        let rx = projector.subscribe();
        projector.observe(&[TagSample::new("1", 0.0, 0.0, -1.0)]);
        assert_eq!(rx.borrow()[0].id, "1");
    }
}
