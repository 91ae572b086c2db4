//! Error types shared by the classification core.

use thiserror::Error;

/// Result alias used across the classification core.
pub type Result<T> = std::result::Result<T, ClassifyError>;

/// Errors surfaced by dataset, model, and scheduling operations.
///
/// Every variant is reported at the operation boundary that produced it; none of them stop
/// the scheduler loops.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// A detector, custom model, or feature extractor failed to load.
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    /// Feature vector lengths disagree.
    #[error("Feature length mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An example label was empty.
    #[error("Label must not be empty")]
    InvalidLabel,

    /// A dataset offered for import or replacement failed validation.
    #[error("{}", describe_invalid_dataset(.indices, .reason))]
    InvalidDataset { indices: Vec<usize>, reason: String },

    /// The persisted dataset could not be decoded.
    #[error("Stored dataset is corrupt: {0}")]
    CorruptDataset(String),

    /// Inference was requested before the required model was loaded.
    #[error("{0} is not loaded")]
    NotLoaded(String),

    /// The camera could not be opened.
    #[error("Camera unavailable: {0}")]
    CameraAccess(String),

    /// A loaded model failed during a forward pass.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// The persistent key-value store reported an error.
    #[error("Storage error: {0}")]
    Storage(#[from] crate::dataset::StoreError),

    #[error("Dataset serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] crate::settings::ConfigError),
}

impl ClassifyError {
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    pub fn not_loaded<S: Into<String>>(what: S) -> Self {
        Self::NotLoaded(what.into())
    }

    pub fn camera<S: Into<String>>(msg: S) -> Self {
        Self::CameraAccess(msg.into())
    }

    pub fn invalid_dataset<S: Into<String>>(indices: Vec<usize>, reason: S) -> Self {
        Self::InvalidDataset {
            indices,
            reason: reason.into(),
        }
    }
}

fn describe_invalid_dataset(indices: &[usize], reason: &str) -> String {
    if indices.is_empty() {
        return format!("Invalid dataset: {reason}");
    }
    let listed = indices
        .iter()
        .map(|index| index.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("Invalid dataset: {reason} (records {listed})")
}
