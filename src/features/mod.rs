//! Lazily loaded feature extractor shared by training and nearest-neighbour inference.
//!
//! The port loads its extractor at most once at a time: callers that arrive while a load
//! is in flight block on a condition variable and receive the same handle (or the same
//! failure). A failed load leaves the port empty so a later call can retry.

mod histogram;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

pub use histogram::{ColorHistogramExtractor, HistogramExtractorLoader};

use crate::dataset::FeatureVector;
use crate::error::{ClassifyError, Result};
use crate::frame::Frame;
use crate::status::StatusReporter;

/// Maps a frame to a fixed-length feature vector.
pub trait FeatureExtractor: Send + Sync {
    fn name(&self) -> &str;
    /// Length of every vector this extractor produces.
    fn feature_len(&self) -> usize;
    fn extract(&self, frame: &Frame) -> Result<FeatureVector>;
}

/// Fetches and initializes a feature extractor. May block for a long time.
pub trait ExtractorLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn FeatureExtractor>>;
}

enum LoadState {
    Empty,
    Loading,
    Ready(Arc<dyn FeatureExtractor>),
}

struct PortInner {
    state: LoadState,
    /// Bumped on every failed load so waiters can tell their load apart from a later one.
    failures: u64,
    last_error: Option<String>,
}

/// Cached singleton around an [`ExtractorLoader`].
pub struct FeaturePort {
    loader: Box<dyn ExtractorLoader>,
    inner: Mutex<PortInner>,
    loaded: Condvar,
    status: StatusReporter,
}

impl FeaturePort {
    pub fn new(loader: Box<dyn ExtractorLoader>, status: StatusReporter) -> Self {
        Self {
            loader,
            inner: Mutex::new(PortInner {
                state: LoadState::Empty,
                failures: 0,
                last_error: None,
            }),
            loaded: Condvar::new(),
            status,
        }
    }

    /// Port backed by the built-in colour histogram extractor.
    pub fn with_histogram(status: StatusReporter) -> Self {
        Self::new(Box::new(HistogramExtractorLoader::default()), status)
    }

    /// Return the extractor, loading it first if needed.
    pub fn ensure_loaded(&self) -> Result<Arc<dyn FeatureExtractor>> {
        let mut inner = self.lock()?;
        let failures_seen = inner.failures;
        inner = self
            .loaded
            .wait_while(inner, |inner| matches!(inner.state, LoadState::Loading))
            .map_err(|_| poisoned())?;
        match &inner.state {
            LoadState::Ready(extractor) => {
                self.status.info("Feature extractor already loaded");
                return Ok(Arc::clone(extractor));
            }
            LoadState::Empty if inner.failures != failures_seen => {
                let reason = inner.last_error.clone().unwrap_or_default();
                return Err(ClassifyError::ModelLoad(reason));
            }
            LoadState::Empty | LoadState::Loading => {}
        }
        inner.state = LoadState::Loading;
        drop(inner);

        self.status.busy("Loading feature extractor");
        let result = catch_unwind(AssertUnwindSafe(|| self.loader.load()))
            .unwrap_or_else(|_| Err(loader_panicked()));

        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let outcome = match result {
            Ok(extractor) => {
                inner.state = LoadState::Ready(Arc::clone(&extractor));
                inner.last_error = None;
                self.status
                    .info(format!("Feature extractor loaded: {}", extractor.name()));
                Ok(extractor)
            }
            Err(err) => {
                let reason = match err {
                    ClassifyError::ModelLoad(reason) => reason,
                    other => other.to_string(),
                };
                inner.state = LoadState::Empty;
                inner.failures += 1;
                inner.last_error = Some(reason.clone());
                self.status
                    .error(format!("Feature extractor failed to load: {reason}"));
                Err(ClassifyError::ModelLoad(reason))
            }
        };
        drop(inner);
        self.loaded.notify_all();
        outcome
    }

    pub fn is_loaded(&self) -> bool {
        self.lock()
            .map(|inner| matches!(inner.state, LoadState::Ready(_)))
            .unwrap_or(false)
    }

    /// Feature vector for `frame`. Fails with `NotLoaded` before [`Self::ensure_loaded`].
    pub fn extract(&self, frame: &Frame) -> Result<FeatureVector> {
        let extractor = match &self.lock()?.state {
            LoadState::Ready(extractor) => Arc::clone(extractor),
            _ => return Err(ClassifyError::not_loaded("Feature extractor")),
        };
        extractor.extract(frame)
    }

    fn lock(&self) -> Result<MutexGuard<'_, PortInner>> {
        self.inner.lock().map_err(|_| poisoned())
    }
}

fn loader_panicked() -> ClassifyError {
    ClassifyError::model_load("Feature extractor loader panicked")
}

fn poisoned() -> ClassifyError {
    ClassifyError::model_load("Feature extractor state poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use crate::status::StatusTone;

    struct ConstExtractor;

    impl FeatureExtractor for ConstExtractor {
        fn name(&self) -> &str {
            "const"
        }

        fn feature_len(&self) -> usize {
            2
        }

        fn extract(&self, frame: &Frame) -> Result<FeatureVector> {
            Ok(vec![frame.width as f32, frame.height as f32])
        }
    }

    #[derive(Clone, Default)]
    struct CountingLoader {
        calls: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
        delay: Duration,
    }

    impl ExtractorLoader for CountingLoader {
        fn load(&self) -> Result<Arc<dyn FeatureExtractor>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ClassifyError::model_load("weights missing"));
            }
            Ok(Arc::new(ConstExtractor))
        }
    }

    struct PanickingLoader {
        calls: Arc<AtomicUsize>,
    }

    impl ExtractorLoader for PanickingLoader {
        fn load(&self) -> Result<Arc<dyn FeatureExtractor>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("extractor init blew up");
            }
            Ok(Arc::new(ConstExtractor))
        }
    }

    #[test]
    fn panicking_load_leaves_port_retryable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let port = Arc::new(FeaturePort::new(
            Box::new(PanickingLoader {
                calls: Arc::clone(&calls),
            }),
            StatusReporter::silent(),
        ));

        let err = port.ensure_loaded().err().expect("load should fail");
        assert!(matches!(err, ClassifyError::ModelLoad(_)));
        assert!(!port.is_loaded());

        let (tx, rx) = mpsc::channel();
        let retry_port = Arc::clone(&port);
        thread::spawn(move || {
            let _ = tx.send(retry_port.ensure_loaded().is_ok());
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(true));
        assert!(port.is_loaded());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn extract_before_load_is_not_loaded() {
        let port = FeaturePort::new(
            Box::new(CountingLoader::default()),
            StatusReporter::silent(),
        );
        let err = port.extract(&Frame::solid(2, 2, [0, 0, 0])).unwrap_err();
        assert!(matches!(err, ClassifyError::NotLoaded(_)));
        assert!(!port.is_loaded());
    }

    #[test]
    fn second_call_reuses_handle_and_reports_already_loaded() {
        let loader = CountingLoader::default();
        let (status, rx) = StatusReporter::channel();
        let port = FeaturePort::new(Box::new(loader.clone()), status);

        let first = port.ensure_loaded().unwrap();
        let second = port.ensure_loaded().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        let texts: Vec<_> = rx.try_iter().collect();
        assert_eq!(texts[0].tone, StatusTone::Busy);
        assert_eq!(texts.last().unwrap().text, "Feature extractor already loaded");
        assert_eq!(
            port.extract(&Frame::solid(3, 4, [0, 0, 0])).unwrap(),
            vec![3.0, 4.0]
        );
    }

    #[test]
    fn concurrent_callers_share_one_load() {
        let loader = CountingLoader {
            delay: Duration::from_millis(50),
            ..CountingLoader::default()
        };
        let port = Arc::new(FeaturePort::new(
            Box::new(loader.clone()),
            StatusReporter::silent(),
        ));
        let (tx, rx) = mpsc::channel();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let port = Arc::clone(&port);
                let tx = tx.clone();
                thread::spawn(move || tx.send(port.ensure_loaded().unwrap()).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        drop(tx);
        let extractors: Vec<_> = rx.iter().collect();
        assert_eq!(extractors.len(), 4);
        assert!(extractors.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_can_be_retried() {
        let loader = CountingLoader::default();
        loader.fail.store(true, Ordering::SeqCst);
        let port = FeaturePort::new(Box::new(loader.clone()), StatusReporter::silent());

        let err = port.ensure_loaded().err().expect("load should fail");
        assert!(matches!(err, ClassifyError::ModelLoad(ref reason) if reason == "weights missing"));
        assert!(!port.is_loaded());

        loader.fail.store(false, Ordering::SeqCst);
        port.ensure_loaded().unwrap();
        assert!(port.is_loaded());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }
}
