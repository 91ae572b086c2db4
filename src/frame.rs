//! Video frames and the camera-facing collaborators that produce them.

use std::sync::{Arc, RwLock};

use image::RgbImage;

use crate::error::Result;

/// A decoded RGB8 video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB bytes, `width * height * 3` long.
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// A frame filled with a single color, mostly useful for tests and warm-up.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self::new(data, width, height)
    }

    /// Whether the frame has non-zero dimensions and a buffer that matches them.
    ///
    /// Cameras report zero-sized frames while warming up or paused; that is a normal
    /// condition rather than an error.
    pub fn is_ready(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize * 3
    }

    /// Copy the pixels into an `image` buffer.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// Source of the most recent decoded camera frame.
pub trait FrameSource: Send + Sync {
    /// Latest frame, or `None` while no decoded frame is available.
    fn current_frame(&self) -> Option<Arc<Frame>>;

    /// Whether a frame with usable dimensions is available right now.
    fn frame_ready(&self) -> bool {
        self.current_frame().is_some_and(|frame| frame.is_ready())
    }
}

/// Single-slot frame buffer a capture thread publishes into.
///
/// Publishing swaps the stored `Arc`, so readers always see a whole frame.
#[derive(Debug, Default)]
pub struct LatestFrame {
    slot: RwLock<Option<Arc<Frame>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: Frame) {
        let frame = Arc::new(frame);
        if let Ok(mut slot) = self.slot.write() {
            *slot = Some(frame);
        }
    }

    /// Drop the current frame, e.g. while the camera is paused.
    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = None;
        }
    }
}

impl FrameSource for LatestFrame {
    fn current_frame(&self) -> Option<Arc<Frame>> {
        self.slot.read().ok().and_then(|slot| slot.clone())
    }
}

/// Camera acquisition collaborator.
pub trait CameraDevice: Send {
    /// Start streaming and return the frame source the loops should read.
    ///
    /// Fails with [`crate::ClassifyError::CameraAccess`] when the device cannot be opened.
    fn open(&mut self) -> Result<Arc<dyn FrameSource>>;

    /// Stop streaming and release the device.
    fn release(&mut self);
}
