use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::defaults::{
    MAX_RENDER_FPS, MIN_PERIOD_MS, clamp_noise_floor, clamp_unit, default_background_period_ms,
    default_confidence_threshold, default_database_file, default_dataset_key, default_k,
    default_noise_floor, default_render_fps,
};

/// Settings persisted in `config.toml`.
///
/// Config sections: `classifier`, `scheduler`, `model`, `storage`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub classifier: ClassifierSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

impl AppSettings {
    /// Clamp every value into its accepted range.
    pub fn normalized(mut self) -> Self {
        self.classifier = self.classifier.normalized();
        self.scheduler.background_period_ms =
            self.scheduler.background_period_ms.max(MIN_PERIOD_MS);
        self.scheduler.render_fps = self.scheduler.render_fps.clamp(1, MAX_RENDER_FPS);
        self
    }
}

/// User-tunable prediction settings.
///
/// Config keys: `confidence_threshold`, `k`, `noise_floor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Minimum detector confidence for a box to be drawn.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Neighbour count for nearest-neighbour voting; clamped to the dataset size when used.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Custom model scores at or below this value are dropped.
    #[serde(default = "default_noise_floor")]
    pub noise_floor: f32,
}

impl ClassifierSettings {
    pub fn normalized(mut self) -> Self {
        self.confidence_threshold =
            clamp_unit(self.confidence_threshold, default_confidence_threshold());
        self.k = self.k.max(1);
        self.noise_floor = clamp_noise_floor(self.noise_floor);
        self
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            k: default_k(),
            noise_floor: default_noise_floor(),
        }
    }
}

/// Loop pacing.
///
/// Config keys: `background_period_ms`, `render_fps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_background_period_ms")]
    pub background_period_ms: u64,
    /// Target display refresh rate for the render loop.
    #[serde(default = "default_render_fps")]
    pub render_fps: u32,
}

impl SchedulerSettings {
    pub fn background_period(&self) -> Duration {
        Duration::from_millis(self.background_period_ms.max(MIN_PERIOD_MS))
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.render_fps.clamp(1, MAX_RENDER_FPS)))
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            background_period_ms: default_background_period_ms(),
            render_fps: default_render_fps(),
        }
    }
}

/// Where the custom classifier is fetched from.
///
/// Config keys: `custom_model_url`, `labels_url`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// File path or http(s) URL of the custom model document.
    #[serde(default)]
    pub custom_model_url: Option<String>,
    /// Optional label list location; defaults to `metadata.json` next to the model.
    #[serde(default)]
    pub labels_url: Option<String>,
}

/// Dataset persistence settings.
///
/// Config keys: `database_file`, `dataset_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file name; relative names resolve inside the app root.
    #[serde(default = "default_database_file")]
    pub database_file: String,
    /// Key the training dataset is stored under.
    #[serde(default = "default_dataset_key")]
    pub dataset_key: String,
}

impl StorageSettings {
    /// Database location; relative names resolve inside the app root.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        let path = PathBuf::from(&self.database_file);
        if path.is_absolute() {
            return Ok(path);
        }
        Ok(crate::app_dirs::app_root_dir()?.join(path))
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
            dataset_key: default_dataset_key(),
        }
    }
}

/// Errors that may occur while loading or saving settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to resolve the config directory: {0}")]
    AppDir(#[from] crate::app_dirs::AppDirError),
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config for {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
}
