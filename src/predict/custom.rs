use image::imageops::{self, FilterType};
use ndarray::Array4;

use super::PredictionEntry;
use crate::error::{ClassifyError, Result};
use crate::frame::Frame;

/// Label of the single cache entry written when a background inference tick fails.
pub const PREDICTION_ERROR_LABEL: &str = "prediction error";

/// User-supplied classifier consumed through a batched tensor contract.
pub trait CustomModel: Send + Sync {
    /// Declared input size as `(width, height)`, if the model fixes one.
    fn input_shape(&self) -> Option<(u32, u32)>;

    /// Forward pass over an NCHW batch of one normalized frame, returning one score per
    /// class.
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>>;
}

/// Fetches a custom model plus its label list from a user-provided location.
pub trait CustomModelLoader {
    fn load(&self, source: &str) -> Result<LoadedCustomModel>;
}

/// A custom model together with the labels for its output indices.
pub struct LoadedCustomModel {
    model: Box<dyn CustomModel>,
    labels: Vec<String>,
    source: String,
}

impl LoadedCustomModel {
    pub fn new(
        model: Box<dyn CustomModel>,
        labels: Vec<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            model,
            labels,
            source: source.into(),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Where the model was loaded from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Resize and normalize `frame`, run the model, and rank scores above `noise_floor`.
    ///
    /// Models without a declared input shape receive the frame at its own size.
    pub fn infer(&self, frame: &Frame, noise_floor: f32) -> Result<Vec<PredictionEntry>> {
        let (width, height) = self
            .model
            .input_shape()
            .unwrap_or((frame.width, frame.height));
        let input = frame_to_tensor(frame, width, height)?;
        let scores = self.model.predict(&input)?;
        Ok(rank_scores(&scores, &self.labels, noise_floor))
    }
}

impl std::fmt::Debug for LoadedCustomModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedCustomModel")
            .field("source", &self.source)
            .field("labels", &self.labels.len())
            .finish()
    }
}

/// Convert a frame into a `[1, 3, height, width]` tensor with values in `[0, 1]`.
pub fn frame_to_tensor(frame: &Frame, width: u32, height: u32) -> Result<Array4<f32>> {
    if width == 0 || height == 0 {
        return Err(ClassifyError::inference(format!(
            "invalid model input size {width}x{height}"
        )));
    }
    let image = frame
        .to_rgb_image()
        .ok_or_else(|| ClassifyError::inference("frame buffer does not match its dimensions"))?;
    let image = if (frame.width, frame.height) == (width, height) {
        image
    } else {
        imageops::resize(&image, width, height, FilterType::Triangle)
    };
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] = f32::from(pixel[channel]) / 255.0;
        }
    }
    Ok(tensor)
}

/// Keep scores strictly above `noise_floor`, most confident first.
///
/// Score `i` takes `labels[i]`, or a placeholder when the label list is shorter.
pub fn rank_scores(scores: &[f32], labels: &[String], noise_floor: f32) -> Vec<PredictionEntry> {
    let mut ranked: Vec<PredictionEntry> = scores
        .iter()
        .enumerate()
        .filter(|(_, score)| **score > noise_floor)
        .map(|(index, score)| {
            let label = labels
                .get(index)
                .cloned()
                .unwrap_or_else(|| placeholder_label(index));
            PredictionEntry::new(label, *score)
        })
        .collect();
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    ranked
}

pub fn placeholder_label(index: usize) -> String {
    format!("Class {index}")
}
