//! Exclusive selection of the prediction source the render loop draws from.
//!
//! Exactly one [`Mode`] is active. Loaded detector and custom-model handles stay resident
//! across mode changes so switching back never reloads; only the prediction cache is
//! per-selection state and it is cleared on every transition.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::error::{ClassifyError, Result};
use crate::predict::{
    CustomModelLoader, Detector, DetectorLoader, LoadedCustomModel, PredictionEntry,
};
use crate::scheduler::PredictionCache;
use crate::status::StatusReporter;

/// Active prediction source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Idle,
    Detector,
    CustomModel,
    NearestNeighbor,
}

/// The active mode together with the handle it needs.
#[derive(Clone)]
pub enum ActiveSelection {
    Idle,
    Detector(Arc<dyn Detector>),
    CustomModel(Arc<LoadedCustomModel>),
    NearestNeighbor,
}

impl ActiveSelection {
    pub fn mode(&self) -> Mode {
        match self {
            Self::Idle => Mode::Idle,
            Self::Detector(_) => Mode::Detector,
            Self::CustomModel(_) => Mode::CustomModel,
            Self::NearestNeighbor => Mode::NearestNeighbor,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoadedKind {
    Detector,
    CustomModel,
}

#[derive(Default)]
struct ModeState {
    mode: Mode,
    detector: Option<Arc<dyn Detector>>,
    custom_model: Option<Arc<LoadedCustomModel>>,
    last_loaded: Option<LoadedKind>,
}

pub struct ModeController {
    state: RwLock<ModeState>,
    cache: Arc<PredictionCache>,
    status: StatusReporter,
}

impl ModeController {
    pub fn new(cache: Arc<PredictionCache>, status: StatusReporter) -> Self {
        Self {
            state: RwLock::new(ModeState::default()),
            cache,
            status,
        }
    }

    pub fn mode(&self) -> Mode {
        self.read().mode
    }

    /// Snapshot of the active mode and its handle.
    pub fn selection(&self) -> ActiveSelection {
        let state = self.read();
        match state.mode {
            Mode::Idle => ActiveSelection::Idle,
            Mode::NearestNeighbor => ActiveSelection::NearestNeighbor,
            Mode::Detector => match &state.detector {
                Some(detector) => ActiveSelection::Detector(Arc::clone(detector)),
                None => ActiveSelection::Idle,
            },
            Mode::CustomModel => match &state.custom_model {
                Some(model) => ActiveSelection::CustomModel(Arc::clone(model)),
                None => ActiveSelection::Idle,
            },
        }
    }

    pub fn is_detector_loaded(&self) -> bool {
        self.read().detector.is_some()
    }

    pub fn is_custom_model_loaded(&self) -> bool {
        self.read().custom_model.is_some()
    }

    /// Load a detector, replace any resident one, and switch to [`Mode::Detector`].
    ///
    /// On failure the current mode and handles are left as they were.
    pub fn load_detector(&self, loader: &dyn DetectorLoader) -> Result<()> {
        self.status.busy("Loading detector");
        let detector = loader
            .load()
            .map_err(|err| self.load_failed("Detector", err))?;
        let name = detector.name().to_string();
        {
            let mut state = self.write();
            state.detector = Some(detector);
            state.last_loaded = Some(LoadedKind::Detector);
            self.enter(&mut state, Mode::Detector);
        }
        self.status.info(format!("Detector ready: {name}"));
        Ok(())
    }

    /// Load a custom model from `source`, replace any resident one, and switch to
    /// [`Mode::CustomModel`].
    pub fn load_custom_model(&self, loader: &dyn CustomModelLoader, source: &str) -> Result<()> {
        self.status.busy(format!("Loading custom model from {source}"));
        let model = loader
            .load(source)
            .map_err(|err| self.load_failed("Custom model", err))?;
        let classes = model.labels().len();
        {
            let mut state = self.write();
            state.custom_model = Some(Arc::new(model));
            state.last_loaded = Some(LoadedKind::CustomModel);
            self.enter(&mut state, Mode::CustomModel);
        }
        self.status
            .info(format!("Custom model ready ({classes} labels)"));
        Ok(())
    }

    /// Re-select the resident detector without reloading it.
    pub fn activate_detector(&self) -> Result<()> {
        let mut state = self.write();
        if state.detector.is_none() {
            return Err(ClassifyError::not_loaded("Detector"));
        }
        self.enter(&mut state, Mode::Detector);
        Ok(())
    }

    /// Re-select the resident custom model without reloading it.
    pub fn activate_custom_model(&self) -> Result<()> {
        let mut state = self.write();
        if state.custom_model.is_none() {
            return Err(ClassifyError::not_loaded("Custom model"));
        }
        self.enter(&mut state, Mode::CustomModel);
        Ok(())
    }

    /// Toggle nearest-neighbour mode and return the resulting mode.
    ///
    /// Turning it off falls back to whichever model was loaded most recently, or
    /// [`Mode::Idle`] when none is resident. Turning it off while another mode is active
    /// changes nothing.
    pub fn set_nearest_neighbor(&self, enabled: bool) -> Mode {
        let mut state = self.write();
        if enabled {
            self.enter(&mut state, Mode::NearestNeighbor);
        } else if state.mode == Mode::NearestNeighbor {
            let fallback = match state.last_loaded {
                Some(LoadedKind::Detector) if state.detector.is_some() => Mode::Detector,
                Some(LoadedKind::CustomModel) if state.custom_model.is_some() => {
                    Mode::CustomModel
                }
                _ => Mode::Idle,
            };
            self.enter(&mut state, fallback);
        }
        state.mode
    }

    /// Replace the prediction cache with `entries` if `model` is still the selected custom
    /// model. Holding the state lock keeps a concurrent transition from being overwritten.
    pub fn publish_if_selected(
        &self,
        model: &Arc<LoadedCustomModel>,
        entries: Vec<PredictionEntry>,
    ) -> bool {
        let state = self.read();
        let selected = state.mode == Mode::CustomModel
            && state
                .custom_model
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, model));
        if selected {
            self.cache.replace(entries);
        }
        selected
    }

    fn enter(&self, state: &mut ModeState, mode: Mode) {
        if state.mode != mode {
            debug!("Mode {:?} -> {:?}", state.mode, mode);
        }
        state.mode = mode;
        self.cache.clear();
    }

    fn load_failed(&self, what: &str, err: ClassifyError) -> ClassifyError {
        let reason = match err {
            ClassifyError::ModelLoad(reason) => reason,
            other => other.to_string(),
        };
        self.status.error(format!("{what} failed to load: {reason}"));
        ClassifyError::ModelLoad(reason)
    }

    fn read(&self) -> RwLockReadGuard<'_, ModeState> {
        self.state.read().unwrap_or_else(|poisoned| {
            warn!("Mode state lock poisoned; recovering.");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, ModeState> {
        self.state.write().unwrap_or_else(|poisoned| {
            warn!("Mode state lock poisoned; recovering.");
            poisoned.into_inner()
        })
    }
}
