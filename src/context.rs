//! The classifier context: one owner for the dataset, the feature port, the mode
//! controller, and the prediction cache, handed to both scheduler loops.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

use crate::dataset::{
    DatasetExport, DatasetSnapshot, DatasetStore, LabelCounts, SqliteKeyValueStore,
    TrainingExample,
};
use crate::error::{ClassifyError, Result};
use crate::features::FeaturePort;
use crate::frame::Frame;
use crate::mode::{ActiveSelection, Mode, ModeController};
use crate::predict::{
    CachedModelSource, CustomModelLoader, DetectorLoader, DetectorSource, IdleSource,
    NearestNeighborSource, PredictionSource, UrlModelLoader,
};
use crate::scheduler::PredictionCache;
use crate::settings::{AppSettings, ClassifierSettings, ModelSettings};
use crate::status::StatusReporter;

pub struct ClassifierContext {
    modes: ModeController,
    features: Arc<FeaturePort>,
    dataset: RwLock<DatasetStore>,
    cache: Arc<PredictionCache>,
    classifier: RwLock<ClassifierSettings>,
    status: StatusReporter,
}

impl ClassifierContext {
    pub fn new(
        features: FeaturePort,
        dataset: DatasetStore,
        classifier: ClassifierSettings,
        status: StatusReporter,
    ) -> Self {
        let cache = Arc::new(PredictionCache::new());
        Self {
            modes: ModeController::new(Arc::clone(&cache), status.clone()),
            features: Arc::new(features),
            dataset: RwLock::new(dataset),
            cache,
            classifier: RwLock::new(classifier.normalized()),
            status,
        }
    }

    /// Context backed by the configured SQLite store and the built-in histogram
    /// extractor. A corrupt stored dataset is reported and the session starts empty.
    pub fn open(settings: &AppSettings, status: StatusReporter) -> Result<Self> {
        let path = settings.storage.database_path()?;
        let store = Arc::new(SqliteKeyValueStore::open(&path)?);
        let mut dataset = DatasetStore::with_persistence(
            store,
            &settings.storage.dataset_key,
            status.clone(),
        );
        match dataset.restore() {
            Ok(0) => {}
            Ok(count) => status.info(format!("Restored {count} training examples")),
            Err(err) => status.warn(err.to_string()),
        }
        Ok(Self::new(
            FeaturePort::with_histogram(status.clone()),
            dataset,
            settings.classifier.clone(),
            status,
        ))
    }

    pub fn modes(&self) -> &ModeController {
        &self.modes
    }

    pub fn features(&self) -> &Arc<FeaturePort> {
        &self.features
    }

    pub fn cache(&self) -> &Arc<PredictionCache> {
        &self.cache
    }

    pub fn status(&self) -> &StatusReporter {
        &self.status
    }

    pub fn mode(&self) -> Mode {
        self.modes.mode()
    }

    pub fn load_detector(&self, loader: &dyn DetectorLoader) -> Result<()> {
        self.modes.load_detector(loader)
    }

    pub fn load_custom_model(&self, loader: &dyn CustomModelLoader, source: &str) -> Result<()> {
        self.modes.load_custom_model(loader, source)
    }

    /// Load the custom model named in the `[model]` settings. Returns `false` when none is
    /// configured.
    pub fn load_configured_model(&self, model: &ModelSettings) -> Result<bool> {
        let Some(source) = model
            .custom_model_url
            .as_deref()
            .filter(|source| !source.trim().is_empty())
        else {
            return Ok(false);
        };
        let loader = UrlModelLoader::new(model.labels_url.clone());
        self.modes.load_custom_model(&loader, source)?;
        Ok(true)
    }

    /// Load the feature extractor if needed, then switch to nearest-neighbour mode.
    pub fn enable_nearest_neighbor(&self) -> Result<Mode> {
        self.features.ensure_loaded()?;
        Ok(self.modes.set_nearest_neighbor(true))
    }

    pub fn disable_nearest_neighbor(&self) -> Mode {
        self.modes.set_nearest_neighbor(false)
    }

    /// Extract features from `frame` and store them under `label`.
    ///
    /// Returns the new dataset size.
    pub fn add_example(&self, label: &str, frame: &Frame) -> Result<usize> {
        let result = self.try_add_example(label, frame);
        match &result {
            Ok(count) => self
                .status
                .info(format!("Added example \"{}\" ({count} total)", label.trim())),
            Err(err) => self.status.error(err.to_string()),
        }
        result
    }

    fn try_add_example(&self, label: &str, frame: &Frame) -> Result<usize> {
        if label.trim().is_empty() {
            return Err(ClassifyError::InvalidLabel);
        }
        if !frame.is_ready() {
            return Err(ClassifyError::camera("no frame available"));
        }
        if !self.features.is_loaded() {
            self.features.ensure_loaded()?;
        }
        let features = self.features.extract(frame)?;
        self.dataset_mut().add_example(label, features)
    }

    pub fn replace_dataset(&self, examples: Vec<TrainingExample>) -> Result<()> {
        self.dataset_mut()
            .replace(examples)
            .inspect_err(|err| self.status.error(err.to_string()))
    }

    pub fn clear_dataset(&self) {
        self.dataset_mut().clear();
        self.status.info("Dataset cleared");
    }

    pub fn export_dataset(&self) -> Result<DatasetExport> {
        self.dataset()
            .export()
            .inspect_err(|err| self.status.error(err.to_string()))
    }

    pub fn import_dataset(&self, bytes: &[u8]) -> Result<usize> {
        let result = self.dataset_mut().import(bytes);
        match &result {
            Ok(count) => self.status.info(format!("Imported {count} training examples")),
            Err(err) => self.status.error(err.to_string()),
        }
        result
    }

    pub fn dataset_snapshot(&self) -> DatasetSnapshot {
        self.dataset().snapshot()
    }

    pub fn label_counts(&self) -> LabelCounts {
        self.dataset().label_counts().clone()
    }

    /// Wait until queued dataset writes reach the store.
    pub fn flush(&self) {
        self.dataset().flush();
    }

    pub fn classifier_settings(&self) -> ClassifierSettings {
        self.classifier_read().clone()
    }

    pub fn set_classifier_settings(&self, settings: ClassifierSettings) {
        *self.classifier_write() = settings.normalized();
    }

    pub fn set_confidence_threshold(&self, threshold: f32) {
        let mut settings = self.classifier_settings();
        settings.confidence_threshold = threshold;
        self.set_classifier_settings(settings);
    }

    pub fn set_k(&self, k: usize) {
        let mut settings = self.classifier_settings();
        settings.k = k;
        self.set_classifier_settings(settings);
    }

    /// Source the render loop should draw from right now.
    pub fn prediction_source(&self) -> Box<dyn PredictionSource> {
        let settings = self.classifier_settings();
        match self.modes.selection() {
            ActiveSelection::Idle => Box::new(IdleSource),
            ActiveSelection::Detector(detector) => Box::new(DetectorSource::new(
                detector,
                settings.confidence_threshold,
            )),
            ActiveSelection::CustomModel(_) => {
                Box::new(CachedModelSource::new(Arc::clone(&self.cache)))
            }
            ActiveSelection::NearestNeighbor => Box::new(NearestNeighborSource::new(
                Arc::clone(&self.features),
                self.dataset_snapshot(),
                settings.k,
            )),
        }
    }

    fn dataset(&self) -> RwLockReadGuard<'_, DatasetStore> {
        self.dataset.read().unwrap_or_else(|poisoned| {
            warn!("Dataset lock poisoned; recovering.");
            poisoned.into_inner()
        })
    }

    fn dataset_mut(&self) -> RwLockWriteGuard<'_, DatasetStore> {
        self.dataset.write().unwrap_or_else(|poisoned| {
            warn!("Dataset lock poisoned; recovering.");
            poisoned.into_inner()
        })
    }

    fn classifier_read(&self) -> RwLockReadGuard<'_, ClassifierSettings> {
        self.classifier
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn classifier_write(&self) -> RwLockWriteGuard<'_, ClassifierSettings> {
        self.classifier
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
