use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use livelabel::dataset::DatasetStore;
use livelabel::features::FeaturePort;
use livelabel::frame::{CameraDevice, Frame, FrameSource, LatestFrame};
use livelabel::predict::{
    CustomModel, CustomModelLoader, LoadedCustomModel, Overlay, PREDICTION_ERROR_LABEL,
    PredictionEntry,
};
use livelabel::scheduler::{
    BackgroundWorker, RenderLoop, RenderOutcome, RenderSurface, TickOutcome,
};
use livelabel::settings::{ClassifierSettings, SchedulerSettings};
use livelabel::status::{StatusReporter, StatusTone};
use livelabel::{CameraSession, ClassifierContext, ClassifyError, Mode};
use ndarray::Array4;

#[derive(Clone, Default)]
struct ModelProbe {
    calls: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

struct ScriptedModel {
    probe: ModelProbe,
}

impl CustomModel for ScriptedModel {
    fn input_shape(&self) -> Option<(u32, u32)> {
        Some((4, 4))
    }

    fn predict(&self, _input: &Array4<f32>) -> livelabel::Result<Vec<f32>> {
        self.probe.calls.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail.load(Ordering::SeqCst) {
            return Err(ClassifyError::inference("tensor backend crashed"));
        }
        Ok(vec![0.02, 0.5, 0.005])
    }
}

struct ScriptedLoader {
    probe: ModelProbe,
}

impl CustomModelLoader for ScriptedLoader {
    fn load(&self, source: &str) -> livelabel::Result<LoadedCustomModel> {
        Ok(LoadedCustomModel::new(
            Box::new(ScriptedModel {
                probe: self.probe.clone(),
            }),
            vec!["a".into(), "b".into(), "c".into()],
            source,
        ))
    }
}

/// Blocks inside `predict` until the test releases it.
struct GatedModel {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl CustomModel for GatedModel {
    fn input_shape(&self) -> Option<(u32, u32)> {
        None
    }

    fn predict(&self, _input: &Array4<f32>) -> livelabel::Result<Vec<f32>> {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv();
        Ok(vec![0.9])
    }
}

struct GatedLoader {
    model: Mutex<Option<GatedModel>>,
}

impl CustomModelLoader for GatedLoader {
    fn load(&self, source: &str) -> livelabel::Result<LoadedCustomModel> {
        let model = self.model.lock().unwrap().take().unwrap();
        Ok(LoadedCustomModel::new(Box::new(model), vec!["old".into()], source))
    }
}

#[derive(Clone, Default)]
struct RecordingSurface {
    drawn: Arc<Mutex<Vec<Overlay>>>,
}

impl RecordingSurface {
    fn count(&self) -> usize {
        self.drawn.lock().unwrap().len()
    }

    fn last(&self) -> Option<Overlay> {
        self.drawn.lock().unwrap().last().cloned()
    }
}

impl RenderSurface for RecordingSurface {
    fn draw(&mut self, _frame: &Frame, overlay: &Overlay) {
        self.drawn.lock().unwrap().push(overlay.clone());
    }
}

struct FakeCamera {
    frames: Arc<LatestFrame>,
    available: bool,
    released: Arc<AtomicUsize>,
}

impl CameraDevice for FakeCamera {
    fn open(&mut self) -> livelabel::Result<Arc<dyn FrameSource>> {
        if !self.available {
            return Err(ClassifyError::camera("permission denied"));
        }
        Ok(self.frames.clone())
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

fn context_with(status: StatusReporter) -> Arc<ClassifierContext> {
    Arc::new(ClassifierContext::new(
        FeaturePort::with_histogram(status.clone()),
        DatasetStore::in_memory(),
        ClassifierSettings::default(),
        status,
    ))
}

fn context() -> Arc<ClassifierContext> {
    context_with(StatusReporter::silent())
}

fn custom_mode(ctx: &ClassifierContext) -> ModelProbe {
    let probe = ModelProbe::default();
    ctx.load_custom_model(
        &ScriptedLoader {
            probe: probe.clone(),
        },
        "memory://scripted",
    )
    .unwrap();
    probe
}

fn live_frames() -> Arc<LatestFrame> {
    let frames = Arc::new(LatestFrame::new());
    frames.publish(Frame::solid(16, 12, [30, 60, 90]));
    frames
}

fn fast_settings() -> SchedulerSettings {
    SchedulerSettings {
        background_period_ms: 5,
        render_fps: 200,
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn tick_outside_custom_mode_empties_cache() {
    let ctx = context();
    ctx.cache().replace(vec![PredictionEntry::new("stale", 0.9)]);
    let mut worker = BackgroundWorker::new(ctx.clone(), live_frames());

    assert_eq!(worker.tick(), TickOutcome::Cleared);
    assert!(ctx.cache().is_empty());
}

#[test]
fn tick_in_custom_mode_ranks_scores_above_noise_floor() {
    let ctx = context();
    custom_mode(&ctx);
    let mut worker = BackgroundWorker::new(ctx.clone(), live_frames());

    assert_eq!(worker.tick(), TickOutcome::Updated(2));
    assert_eq!(
        &ctx.cache().snapshot()[..],
        &[PredictionEntry::new("b", 0.5), PredictionEntry::new("a", 0.02)]
    );
}

#[test]
fn results_of_a_replaced_model_are_dropped() {
    let ctx = context();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let loader = GatedLoader {
        model: Mutex::new(Some(GatedModel {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        })),
    };
    ctx.load_custom_model(&loader, "memory://gated").unwrap();

    let mut worker = BackgroundWorker::new(ctx.clone(), live_frames());
    let tick = thread::spawn(move || worker.tick());
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    custom_mode(&ctx);
    release_tx.send(()).unwrap();

    assert_eq!(tick.join().unwrap(), TickOutcome::Cleared);
    assert!(ctx.cache().is_empty());

    let mut worker = BackgroundWorker::new(ctx.clone(), live_frames());
    assert_eq!(worker.tick(), TickOutcome::Updated(2));
    assert_eq!(ctx.cache().snapshot()[0], PredictionEntry::new("b", 0.5));
}

#[test]
fn tick_without_frame_leaves_cache_alone() {
    let ctx = context();
    let probe = custom_mode(&ctx);
    let frames = Arc::new(LatestFrame::new());
    let mut worker = BackgroundWorker::new(ctx.clone(), frames.clone());
    frames.publish(Frame::solid(4, 4, [1, 1, 1]));
    worker.tick();
    frames.publish(Frame::new(Vec::new(), 0, 0));

    assert_eq!(worker.tick(), TickOutcome::NoFrame);
    assert_eq!(ctx.cache().snapshot().len(), 2);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn failing_tick_writes_error_entry_and_later_ticks_recover() {
    let (status, rx) = StatusReporter::channel();
    let ctx = context_with(status);
    let probe = custom_mode(&ctx);
    let mut worker = BackgroundWorker::new(ctx.clone(), live_frames());
    probe.fail.store(true, Ordering::SeqCst);

    assert_eq!(worker.tick(), TickOutcome::Failed);
    assert_eq!(worker.tick(), TickOutcome::Failed);
    assert_eq!(
        &ctx.cache().snapshot()[..],
        &[PredictionEntry::new(PREDICTION_ERROR_LABEL, 0.0)]
    );
    let errors = rx
        .try_iter()
        .filter(|msg| msg.tone == StatusTone::Error)
        .filter(|msg| msg.text.contains("tensor backend crashed"))
        .count();
    assert_eq!(errors, 1);

    probe.fail.store(false, Ordering::SeqCst);
    assert_eq!(worker.tick(), TickOutcome::Updated(2));
}

#[test]
fn render_skips_until_a_frame_is_ready() {
    let ctx = context();
    let frames = Arc::new(LatestFrame::new());
    let surface = RecordingSurface::default();
    let mut render = RenderLoop::new(ctx, frames.clone(), Box::new(surface.clone()));

    assert_eq!(render.render_once(), RenderOutcome::Skipped);
    frames.publish(Frame::solid(2, 2, [0, 0, 0]));
    assert_eq!(render.render_once(), RenderOutcome::Drawn("idle"));
    assert_eq!(surface.last(), Some(Overlay::Bare));
}

#[test]
fn render_draws_cached_predictions_without_running_the_model() {
    let ctx = context();
    let probe = custom_mode(&ctx);
    let frames = live_frames();
    let surface = RecordingSurface::default();
    let mut worker = BackgroundWorker::new(ctx.clone(), frames.clone());
    let mut render = RenderLoop::new(ctx.clone(), frames, Box::new(surface.clone()));

    worker.tick();
    for _ in 0..5 {
        assert_eq!(render.render_once(), RenderOutcome::Drawn("custom model"));
    }

    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        surface.last(),
        Some(Overlay::Labels(Arc::from(vec![
            PredictionEntry::new("b", 0.5),
            PredictionEntry::new("a", 0.02),
        ])))
    );
}

#[test]
fn render_failure_draws_bare_frame() {
    let ctx = context();
    // Nearest-neighbour mode with a dataset whose vectors cannot match the extractor.
    ctx.replace_dataset(vec![livelabel::dataset::TrainingExample::new(
        "odd",
        vec![1.0],
    )])
    .unwrap();
    assert_eq!(ctx.enable_nearest_neighbor().unwrap(), Mode::NearestNeighbor);
    let surface = RecordingSurface::default();
    let mut render = RenderLoop::new(ctx, live_frames(), Box::new(surface.clone()));

    assert_eq!(render.render_once(), RenderOutcome::Drawn("nearest neighbour"));
    assert_eq!(surface.last(), Some(Overlay::Bare));
}

#[test]
fn session_runs_both_loops_and_stops_cleanly() {
    let ctx = context();
    let probe = custom_mode(&ctx);
    let released = Arc::new(AtomicUsize::new(0));
    let surface = RecordingSurface::default();
    let mut session = CameraSession::new(ctx.clone(), fast_settings());

    session
        .start(
            Box::new(FakeCamera {
                frames: live_frames(),
                available: true,
                released: released.clone(),
            }),
            Box::new(surface.clone()),
        )
        .unwrap();
    assert!(session.is_running());
    assert!(wait_until(|| probe.calls.load(Ordering::SeqCst) >= 3));
    assert!(wait_until(|| matches!(
        surface.last(),
        Some(Overlay::Labels(entries)) if entries.len() == 2
    )));

    assert!(session.stop().is_some());
    assert!(!session.is_running());
    assert_eq!(released.load(Ordering::SeqCst), 1);

    let calls = probe.calls.load(Ordering::SeqCst);
    let draws = surface.count();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(probe.calls.load(Ordering::SeqCst), calls);
    assert_eq!(surface.count(), draws);
}

#[test]
fn restarting_creates_a_fresh_cycle() {
    let ctx = context();
    let probe = custom_mode(&ctx);
    let released = Arc::new(AtomicUsize::new(0));
    let frames = live_frames();
    let camera = || FakeCamera {
        frames: frames.clone(),
        available: true,
        released: released.clone(),
    };
    let mut session = CameraSession::new(ctx, fast_settings());

    session
        .start(Box::new(camera()), Box::new(RecordingSurface::default()))
        .unwrap();
    let surface = session.stop().unwrap();
    let calls = probe.calls.load(Ordering::SeqCst);

    session.start(Box::new(camera()), surface).unwrap();
    assert!(wait_until(|| probe.calls.load(Ordering::SeqCst) > calls));
    drop(session);

    assert_eq!(released.load(Ordering::SeqCst), 2);
}

#[test]
fn unavailable_camera_starts_nothing() {
    let (status, rx) = StatusReporter::channel();
    let ctx = context_with(status);
    let released = Arc::new(AtomicUsize::new(0));
    let mut session = CameraSession::new(ctx, fast_settings());

    let err = session
        .start(
            Box::new(FakeCamera {
                frames: live_frames(),
                available: false,
                released,
            }),
            Box::new(RecordingSurface::default()),
        )
        .unwrap_err();

    assert!(matches!(err, ClassifyError::CameraAccess(_)));
    assert!(!session.is_running());
    assert!(
        rx.try_iter()
            .any(|msg| msg.tone == StatusTone::Error && msg.text.contains("permission denied"))
    );
}

#[test]
fn paused_camera_keeps_render_loop_alive() {
    let ctx = context();
    let frames = Arc::new(LatestFrame::new());
    let surface = RecordingSurface::default();
    let mut session = CameraSession::new(ctx, fast_settings());
    session
        .start(
            Box::new(FakeCamera {
                frames: frames.clone(),
                available: true,
                released: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(surface.clone()),
        )
        .unwrap();

    thread::sleep(Duration::from_millis(30));
    assert_eq!(surface.count(), 0);

    frames.publish(Frame::solid(8, 8, [5, 5, 5]));
    assert!(wait_until(|| surface.count() > 0));

    frames.clear();
    thread::sleep(Duration::from_millis(20));
    let paused = surface.count();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(surface.count(), paused);

    frames.publish(Frame::solid(8, 8, [6, 6, 6]));
    assert!(wait_until(|| surface.count() > paused));
    assert!(session.is_running());
}
