//! Real-time classification core: pick a prediction source, train a nearest-neighbour
//! classifier from camera frames, and draw ranked predictions without stalling the display.

/// App data directory resolution.
pub mod app_dirs;
/// Shared owner of models, dataset, and settings.
pub mod context;
/// Training dataset storage, persistence, and import/export.
pub mod dataset;
/// Crate error type.
pub mod error;
/// Lazily loaded feature extractors.
pub mod features;
/// Frames and camera collaborators.
pub mod frame;
pub(crate) mod http_client;
/// Nearest-neighbour voting.
pub mod knn;
/// Tracing setup with rotating log files.
pub mod logging;
/// Exclusive prediction source selection.
pub mod mode;
/// Software overlay rendering.
pub mod overlay;
/// Prediction sources and model contracts.
pub mod predict;
/// Render and background inference loops.
pub mod scheduler;
/// `config.toml` settings.
pub mod settings;
/// Status messages for the front end.
pub mod status;

pub use context::ClassifierContext;
pub use error::{ClassifyError, Result};
pub use mode::{ActiveSelection, Mode, ModeController};
pub use scheduler::{CameraSession, PredictionCache};
