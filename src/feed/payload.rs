//! Decoding of network tag payloads.
//!
//! A payload is a JSON array of tag records:
//!
//! ```json
//! [{"id": 3, "pose": [0.12, -0.05, 0.8], "z_distance": 0.8}]
//! ```
//!
//! `pose` is in sensor units with y pointing down. The horizontal and vertical
//! axes are multiplied by the scale factor and y is flipped so that up is
//! positive. Depth comes from `z_distance` when present (else `pose[2]`) and is
//! not scaled.

use serde::Deserialize;
use serde_json::Value;

use crate::error::FeedError;

use super::TagSample;

/// One record as sent by the tag detector.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TagRecord {
    /// Tag id, numeric or string
    pub id: Value,
    pub pose: [f64; 3],
    #[serde(default)]
    pub z_distance: Option<f64>,
}

impl TagRecord {
    fn id_string(&self) -> Result<String, FeedError> {
        match &self.id {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(FeedError::MalformedPayload {
                reason: format!("tag id must be a number or string, got {}", other),
            }),
        }
    }

    /// Convert to engine coordinates.
    pub fn to_sample(&self, scale_factor: f64) -> Result<TagSample, FeedError> {
        let [pose_x, pose_y, pose_z] = self.pose;
        let sample = TagSample {
            id: self.id_string()?,
            x: pose_x * scale_factor,
            y: -pose_y * scale_factor,
            z: self.z_distance.unwrap_or(pose_z),
        };
        if !(sample.x.is_finite() && sample.y.is_finite() && sample.z.is_finite()) {
            return Err(FeedError::MalformedPayload {
                reason: format!("non-finite coordinates for tag {}", sample.id),
            });
        }
        Ok(sample)
    }
}

/// Decode a whole payload.
///
/// Any defect (not JSON, not an array, a record with missing or mistyped
/// fields) rejects the entire payload; partial batches are never produced.
pub fn parse_payload(text: &str, scale_factor: f64) -> Result<Vec<TagSample>, FeedError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Array(items) = value else {
        return Err(FeedError::MalformedPayload {
            reason: "expected a JSON array of tag records".to_string(),
        });
    };

    items
        .into_iter()
        .map(|item| {
            let record: TagRecord = serde_json::from_value(item)?;
            record.to_sample(scale_factor)
        })
        .collect()
}
