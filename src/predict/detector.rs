use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::frame::Frame;

/// Box in normalized `[0, 1]` image coordinates, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Corners as `[x0, y0, x1, y1]`.
    pub fn corners(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }
}

/// A labeled box reported by the object detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// Pretrained bounding-box detector.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Fetches and initializes a detector.
pub trait DetectorLoader {
    fn load(&self) -> Result<Arc<dyn Detector>>;
}

/// Keep detections at or above `threshold`, most confident first.
pub fn filter_by_confidence(mut detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections.retain(|detection| detection.confidence >= threshold);
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detections
}
