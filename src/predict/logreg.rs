//! Logistic regression over raw frame pixels, loadable from a file or URL.

use std::path::{Path, PathBuf};

use ndarray::Array4;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use super::custom::{CustomModel, CustomModelLoader, LoadedCustomModel};
use crate::error::{ClassifyError, Result};
use crate::http_client;

const MAX_MODEL_BYTES: usize = 256 * 1024 * 1024;
const MAX_LABEL_BYTES: usize = 4 * 1024 * 1024;
const DEFAULT_LABELS_FILE: &str = "metadata.json";

/// Versioned logistic regression model over a resized RGB frame.
///
/// `weights` is laid out class-major over the flattened `[3, height, width]` input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRegFrameModel {
    pub model_version: i64,
    pub input_width: u32,
    pub input_height: u32,
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    1.0
}

impl LogRegFrameModel {
    /// Parse and validate a JSON model document.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let model: Self = serde_json::from_slice(bytes)
            .map_err(|err| ClassifyError::model_load(format!("Invalid model file: {err}")))?;
        model.validate().map_err(ClassifyError::ModelLoad)?;
        Ok(model)
    }

    /// Flattened input length, or `None` if it does not fit in `usize`.
    pub fn input_len(&self) -> Option<usize> {
        (self.input_width as usize)
            .checked_mul(self.input_height as usize)
            .and_then(|pixels| pixels.checked_mul(3))
    }

    pub fn classes(&self) -> usize {
        self.bias.len()
    }

    /// Validate the model dimensions.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err("input size must be non-zero".to_string());
        }
        let classes = self.classes();
        if classes == 0 {
            return Err("No classes defined".to_string());
        }
        let expected = self
            .input_len()
            .and_then(|len| len.checked_mul(classes))
            .ok_or_else(|| "input size too large".to_string())?;
        if self.weights.len() != expected {
            return Err("weights length mismatch".to_string());
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err("temperature must be > 0".to_string());
        }
        Ok(())
    }

    /// Class probabilities for a flattened input.
    pub fn predict_proba(&self, input: &[f32]) -> Vec<f32> {
        let Some(dim) = self.input_len() else {
            return Vec::new();
        };
        if input.len() != dim {
            return Vec::new();
        }
        let temp = self.temperature.max(1e-6);
        let logits: Vec<f32> = self
            .bias
            .iter()
            .enumerate()
            .map(|(class, bias)| {
                let row = &self.weights[class * dim..(class + 1) * dim];
                let sum: f32 = row.iter().zip(input).map(|(w, x)| w * x).sum();
                (bias + sum) / temp
            })
            .collect();
        softmax(&logits)
    }
}

impl CustomModel for LogRegFrameModel {
    fn input_shape(&self) -> Option<(u32, u32)> {
        Some((self.input_width, self.input_height))
    }

    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        let expected = [1, 3, self.input_height as usize, self.input_width as usize];
        if input.shape() != expected {
            return Err(ClassifyError::inference(format!(
                "expected input shape {expected:?}, got {:?}",
                input.shape()
            )));
        }
        let flat: Vec<f32> = input.iter().copied().collect();
        Ok(self.predict_proba(&flat))
    }
}

/// Numerically stable softmax.
fn softmax(raw: &[f32]) -> Vec<f32> {
    if raw.is_empty() {
        return Vec::new();
    }
    let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = raw.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 {
        return vec![1.0 / raw.len() as f32; raw.len()];
    }
    exps.into_iter().map(|v| v / sum).collect()
}

/// Loads [`LogRegFrameModel`] documents from http(s) URLs, `file://` URLs, or paths.
///
/// Labels come from `labels_url` when set, otherwise from a `metadata.json` next to the
/// model. Missing labels are not fatal; outputs then fall back to placeholder names.
#[derive(Debug, Clone, Default)]
pub struct UrlModelLoader {
    labels_url: Option<String>,
}

impl UrlModelLoader {
    pub fn new(labels_url: Option<String>) -> Self {
        Self {
            labels_url: labels_url.filter(|url| !url.trim().is_empty()),
        }
    }
}

impl CustomModelLoader for UrlModelLoader {
    fn load(&self, source: &str) -> Result<LoadedCustomModel> {
        let source = source.trim();
        if source.is_empty() {
            return Err(ClassifyError::model_load("Model URL is empty"));
        }
        let location = Location::parse(source)?;
        let bytes = location.read(MAX_MODEL_BYTES)?;
        let model = LogRegFrameModel::from_json(&bytes)?;

        let labels_location = match &self.labels_url {
            Some(url) => Location::parse(url)?,
            None => location.sibling(DEFAULT_LABELS_FILE)?,
        };
        let labels = match labels_location.read(MAX_LABEL_BYTES) {
            Ok(bytes) => parse_label_list(&bytes),
            Err(err) => {
                warn!("Labels unavailable for {source}: {err}");
                Vec::new()
            }
        };
        if !labels.is_empty() && labels.len() != model.classes() {
            warn!(
                "Model {source} has {} classes but {} labels",
                model.classes(),
                labels.len()
            );
        }
        info!("Loaded custom model {source} ({} classes)", model.classes());
        Ok(LoadedCustomModel::new(Box::new(model), labels, source))
    }
}

enum Location {
    Remote(Url),
    Local(PathBuf),
}

impl Location {
    fn parse(source: &str) -> Result<Self> {
        match Url::parse(source) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Self::Remote(url)),
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(Self::Local)
                .map_err(|_| ClassifyError::model_load(format!("Invalid file URL: {source}"))),
            Ok(url) if url.scheme().len() > 1 => Err(ClassifyError::model_load(format!(
                "Unsupported URL scheme: {}",
                url.scheme()
            ))),
            // Relative paths and Windows drive letters land here.
            _ => Ok(Self::Local(PathBuf::from(source))),
        }
    }

    fn sibling(&self, name: &str) -> Result<Self> {
        match self {
            Self::Remote(url) => url
                .join(name)
                .map(Self::Remote)
                .map_err(|err| ClassifyError::model_load(format!("Invalid labels URL: {err}"))),
            Self::Local(path) => Ok(Self::Local(
                path.parent().unwrap_or(Path::new("")).join(name),
            )),
        }
    }

    fn read(&self, max_bytes: usize) -> Result<Vec<u8>> {
        match self {
            Self::Remote(url) => http_client::download(url.as_str(), max_bytes)
                .map_err(|err| ClassifyError::model_load(err.to_string())),
            Self::Local(path) => {
                let bytes = std::fs::read(path).map_err(|err| {
                    ClassifyError::model_load(format!("Read {} failed: {err}", path.display()))
                })?;
                if bytes.len() > max_bytes {
                    return Err(ClassifyError::model_load(format!(
                        "{} exceeds {max_bytes} bytes",
                        path.display()
                    )));
                }
                Ok(bytes)
            }
        }
    }
}

#[derive(Deserialize)]
struct LabelMetadata {
    labels: Vec<String>,
}

/// Parse a label list from `{"labels": [...]}`, a JSON array, or one label per line.
pub fn parse_label_list(bytes: &[u8]) -> Vec<String> {
    if let Ok(metadata) = serde_json::from_slice::<LabelMetadata>(bytes) {
        return metadata.labels;
    }
    if let Ok(labels) = serde_json::from_slice::<Vec<String>>(bytes) {
        return labels;
    }
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
