//! Prediction sources the render loop can draw from.
//!
//! Every source implements [`PredictionSource`]; the mode controller decides which one is
//! current.

mod custom;
mod detector;
mod logreg;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use custom::{
    CustomModel, CustomModelLoader, LoadedCustomModel, PREDICTION_ERROR_LABEL, frame_to_tensor,
    placeholder_label, rank_scores,
};
pub use detector::{BoundingBox, Detection, Detector, DetectorLoader, filter_by_confidence};
pub use logreg::{LogRegFrameModel, UrlModelLoader, parse_label_list};

use crate::dataset::DatasetSnapshot;
use crate::error::Result;
use crate::features::FeaturePort;
use crate::frame::Frame;
use crate::knn;
use crate::scheduler::PredictionCache;

/// One ranked label with a confidence in `[0, 1]`.
///
/// Nearest-neighbour confidences are vote fractions; model confidences are raw scores and
/// need not sum to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionEntry {
    pub label: String,
    pub confidence: f32,
}

impl PredictionEntry {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// What the render loop draws on top of a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    Bare,
    Boxes(Vec<Detection>),
    Labels(Arc<[PredictionEntry]>),
}

/// Produces ranked predictions for the current frame.
pub trait PredictionSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn predict(&self, frame: &Frame) -> Result<Overlay>;
}

/// Draws nothing; used while no source is selected.
pub struct IdleSource;

impl PredictionSource for IdleSource {
    fn name(&self) -> &'static str {
        "idle"
    }

    fn predict(&self, _frame: &Frame) -> Result<Overlay> {
        Ok(Overlay::Bare)
    }
}

/// Runs the detector inline and keeps boxes at or above the confidence threshold.
pub struct DetectorSource {
    detector: Arc<dyn Detector>,
    threshold: f32,
}

impl DetectorSource {
    pub fn new(detector: Arc<dyn Detector>, threshold: f32) -> Self {
        Self {
            detector,
            threshold,
        }
    }
}

impl PredictionSource for DetectorSource {
    fn name(&self) -> &'static str {
        "detector"
    }

    fn predict(&self, frame: &Frame) -> Result<Overlay> {
        let detections = self.detector.detect(frame)?;
        Ok(Overlay::Boxes(filter_by_confidence(
            detections,
            self.threshold,
        )))
    }
}

/// Reads the latest custom-model predictions produced by the background loop.
///
/// No inference happens here, so drawing never waits on the model.
pub struct CachedModelSource {
    cache: Arc<PredictionCache>,
}

impl CachedModelSource {
    pub fn new(cache: Arc<PredictionCache>) -> Self {
        Self { cache }
    }
}

impl PredictionSource for CachedModelSource {
    fn name(&self) -> &'static str {
        "custom model"
    }

    fn predict(&self, _frame: &Frame) -> Result<Overlay> {
        Ok(Overlay::Labels(self.cache.snapshot()))
    }
}

/// Extracts features from the frame and votes among the nearest training examples.
pub struct NearestNeighborSource {
    features: Arc<FeaturePort>,
    dataset: DatasetSnapshot,
    k: usize,
}

impl NearestNeighborSource {
    pub fn new(features: Arc<FeaturePort>, dataset: DatasetSnapshot, k: usize) -> Self {
        Self {
            features,
            dataset,
            k,
        }
    }
}

impl PredictionSource for NearestNeighborSource {
    fn name(&self) -> &'static str {
        "nearest neighbour"
    }

    fn predict(&self, frame: &Frame) -> Result<Overlay> {
        if self.dataset.is_empty() {
            return Ok(Overlay::Labels(Arc::from(Vec::new())));
        }
        let query = self.features.extract(frame)?;
        let ranked = knn::classify(&query, &self.dataset, self.k)?;
        Ok(Overlay::Labels(Arc::from(ranked)))
    }
}
