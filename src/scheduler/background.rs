use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::context::ClassifierContext;
use crate::frame::FrameSource;
use crate::mode::ActiveSelection;
use crate::predict::{PREDICTION_ERROR_LABEL, PredictionEntry};

/// Result of one background tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not in custom-model mode, or the selection changed during inference. Nothing was
    /// published.
    Cleared,
    /// No usable frame; the cache was left as is.
    NoFrame,
    /// The cache now holds this many ranked entries.
    Updated(usize),
    /// Inference failed; the cache holds the single error entry.
    Failed,
}

/// Fixed-period custom-model inference feeding the prediction cache.
pub struct BackgroundWorker {
    context: Arc<ClassifierContext>,
    frames: Arc<dyn FrameSource>,
    last_error: Option<String>,
}

impl BackgroundWorker {
    pub fn new(context: Arc<ClassifierContext>, frames: Arc<dyn FrameSource>) -> Self {
        Self {
            context,
            frames,
            last_error: None,
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        let ActiveSelection::CustomModel(model) = self.context.modes().selection() else {
            self.context.cache().clear();
            return TickOutcome::Cleared;
        };
        let Some(frame) = self.frames.current_frame().filter(|frame| frame.is_ready()) else {
            return TickOutcome::NoFrame;
        };
        let noise_floor = self.context.classifier_settings().noise_floor;
        let result = catch_unwind(AssertUnwindSafe(|| model.infer(&frame, noise_floor)));
        let failure = match result {
            Ok(Ok(entries)) => {
                let count = entries.len();
                // Dropped if the selection changed while the model ran.
                if !self.context.modes().publish_if_selected(&model, entries) {
                    return TickOutcome::Cleared;
                }
                self.last_error = None;
                return TickOutcome::Updated(count);
            }
            Ok(Err(err)) => err.to_string(),
            Err(_) => "inference panicked".to_string(),
        };
        let error_entry = vec![PredictionEntry::new(PREDICTION_ERROR_LABEL, 0.0)];
        if !self.context.modes().publish_if_selected(&model, error_entry) {
            return TickOutcome::Cleared;
        }
        self.report_failure(failure);
        TickOutcome::Failed
    }

    fn report_failure(&mut self, reason: String) {
        if self.last_error.as_deref() == Some(reason.as_str()) {
            debug!("Prediction failed again: {reason}");
        } else {
            self.context
                .status()
                .error(format!("Prediction failed: {reason}"));
            self.last_error = Some(reason);
        }
    }

    /// Tick every `period` until `shutdown` disconnects. Overrunning ticks are not
    /// caught up.
    pub(super) fn run(mut self, period: Duration, shutdown: Receiver<()>) {
        let mut next = Instant::now();
        loop {
            self.tick();
            next += period;
            let now = Instant::now();
            if next < now {
                next = now;
            }
            match shutdown.recv_timeout(next - now) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("Background inference loop stopped");
    }
}
