use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::context::ClassifierContext;
use crate::frame::{Frame, FrameSource};
use crate::predict::Overlay;

/// Where the render loop puts each annotated frame.
pub trait RenderSurface: Send {
    fn draw(&mut self, frame: &Frame, overlay: &Overlay);
}

/// Result of one render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    /// No usable frame yet; nothing was drawn.
    Skipped,
    /// A frame was drawn with the overlay from the named source.
    Drawn(&'static str),
}

/// Per-display-frame pass: pick the active source, predict inline, draw.
///
/// Custom-model predictions come from the cache, so this never waits on the background
/// loop.
pub struct RenderLoop {
    context: Arc<ClassifierContext>,
    frames: Arc<dyn FrameSource>,
    surface: Box<dyn RenderSurface>,
    last_error: Option<String>,
}

impl RenderLoop {
    pub fn new(
        context: Arc<ClassifierContext>,
        frames: Arc<dyn FrameSource>,
        surface: Box<dyn RenderSurface>,
    ) -> Self {
        Self {
            context,
            frames,
            surface,
            last_error: None,
        }
    }

    pub fn render_once(&mut self) -> RenderOutcome {
        let Some(frame) = self.frames.current_frame().filter(|frame| frame.is_ready()) else {
            return RenderOutcome::Skipped;
        };
        let source = self.context.prediction_source();
        let overlay = match catch_unwind(AssertUnwindSafe(|| source.predict(&frame))) {
            Ok(Ok(overlay)) => {
                self.last_error = None;
                overlay
            }
            Ok(Err(err)) => {
                self.report(format!("{} prediction failed: {err}", source.name()));
                Overlay::Bare
            }
            Err(_) => {
                self.report(format!("{} prediction panicked", source.name()));
                Overlay::Bare
            }
        };
        self.surface.draw(&frame, &overlay);
        RenderOutcome::Drawn(source.name())
    }

    /// Render at `interval` until `shutdown` disconnects, then hand the surface back.
    pub(super) fn run(
        mut self,
        interval: Duration,
        shutdown: Receiver<()>,
    ) -> Box<dyn RenderSurface> {
        loop {
            let started = Instant::now();
            self.render_once();
            match shutdown.recv_timeout(interval.saturating_sub(started.elapsed())) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("Render loop stopped");
        self.surface
    }

    pub fn into_surface(self) -> Box<dyn RenderSurface> {
        self.surface
    }

    /// Errors repeat every frame; only surface a message when it changes.
    fn report(&mut self, message: String) {
        if self.last_error.as_deref() != Some(message.as_str()) {
            self.context.status().error(message.clone());
            self.last_error = Some(message);
        }
    }
}
