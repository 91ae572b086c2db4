//! Dual-rate scheduling: a render loop paced to the display and a slower background loop
//! that runs the custom model. The two only share the [`PredictionCache`].

mod background;
mod cache;
mod render;

use std::sync::Arc;
use std::sync::mpsc::{Sender, channel};
use std::thread::{self, JoinHandle};

use tracing::info;

pub use background::{BackgroundWorker, TickOutcome};
pub use cache::PredictionCache;
pub use render::{RenderLoop, RenderOutcome, RenderSurface};

use crate::context::ClassifierContext;
use crate::error::{ClassifyError, Result};
use crate::frame::CameraDevice;
use crate::settings::SchedulerSettings;

struct Running {
    device: Box<dyn CameraDevice>,
    render_shutdown: Sender<()>,
    background_shutdown: Sender<()>,
    render: JoinHandle<Box<dyn RenderSurface>>,
    background: JoinHandle<()>,
}

/// Owns the camera and both loop threads while the camera is on.
pub struct CameraSession {
    context: Arc<ClassifierContext>,
    settings: SchedulerSettings,
    running: Option<Running>,
}

impl CameraSession {
    pub fn new(context: Arc<ClassifierContext>, settings: SchedulerSettings) -> Self {
        Self {
            context,
            settings,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Open the camera and start both loops, stopping any previous cycle first.
    ///
    /// If the camera cannot be opened nothing is started and `CameraAccess` is returned.
    pub fn start(
        &mut self,
        mut device: Box<dyn CameraDevice>,
        surface: Box<dyn RenderSurface>,
    ) -> Result<()> {
        self.stop();
        let frames = match device.open() {
            Ok(frames) => frames,
            Err(err) => {
                let err = match err {
                    ClassifyError::CameraAccess(_) => err,
                    other => ClassifyError::camera(other.to_string()),
                };
                self.context.status().error(err.to_string());
                return Err(err);
            }
        };

        let (render_shutdown, render_rx) = channel();
        let render_loop =
            RenderLoop::new(Arc::clone(&self.context), Arc::clone(&frames), surface);
        let interval = self.settings.render_interval();
        let render = thread::Builder::new()
            .name("render-loop".into())
            .spawn(move || render_loop.run(interval, render_rx));
        let render = match render {
            Ok(handle) => handle,
            Err(err) => return Err(self.spawn_failed(device, "render", err)),
        };

        let (background_shutdown, background_rx) = channel();
        let worker = BackgroundWorker::new(Arc::clone(&self.context), frames);
        let period = self.settings.background_period();
        let background = thread::Builder::new()
            .name("background-inference".into())
            .spawn(move || worker.run(period, background_rx));
        let background = match background {
            Ok(handle) => handle,
            Err(err) => {
                drop(render_shutdown);
                render.join().ok();
                return Err(self.spawn_failed(device, "background", err));
            }
        };

        info!("Camera started");
        self.running = Some(Running {
            device,
            render_shutdown,
            background_shutdown,
            render,
            background,
        });
        Ok(())
    }

    /// Cancel both loops, wait for them, and release the camera.
    ///
    /// Returns the render surface so a later [`Self::start`] can reuse it.
    pub fn stop(&mut self) -> Option<Box<dyn RenderSurface>> {
        let mut running = self.running.take()?;
        drop(running.render_shutdown);
        drop(running.background_shutdown);
        let surface = running.render.join().ok();
        if running.background.join().is_err() {
            self.context
                .status()
                .warn("Background inference loop exited abnormally");
        }
        running.device.release();
        info!("Camera stopped");
        surface
    }

    fn spawn_failed(
        &self,
        mut device: Box<dyn CameraDevice>,
        which: &str,
        err: std::io::Error,
    ) -> ClassifyError {
        device.release();
        let err = ClassifyError::camera(format!("failed to start {which} loop: {err}"));
        self.context.status().error(err.to_string());
        err
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stop();
    }
}
