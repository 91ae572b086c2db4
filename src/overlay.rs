//! Software render target that burns detector boxes into an RGBA copy of the frame and
//! keeps the ranked label lines for whatever UI shows them.

use image::{Rgba, RgbaImage};

use crate::frame::Frame;
use crate::predict::{Detection, Overlay, PredictionEntry};
use crate::scheduler::RenderSurface;

const BOX_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const BOX_THICKNESS: u32 = 2;

#[derive(Debug, Default)]
pub struct FrameCanvas {
    image: RgbaImage,
    lines: Vec<String>,
    frames_drawn: u64,
}

impl FrameCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently drawn frame with boxes applied.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Text lines for the last overlay, most confident first.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }
}

impl RenderSurface for FrameCanvas {
    fn draw(&mut self, frame: &Frame, overlay: &Overlay) {
        self.image = frame_to_rgba(frame);
        self.lines = match overlay {
            Overlay::Bare => Vec::new(),
            Overlay::Boxes(detections) => {
                let dims = self.image.dimensions();
                for detection in detections {
                    if let Some(bbox) = normalize_box(detection.bbox.corners(), dims) {
                        draw_rect(&mut self.image, bbox, BOX_COLOR, BOX_THICKNESS);
                    }
                }
                detections.iter().map(detection_line).collect()
            }
            Overlay::Labels(entries) => entries.iter().map(entry_line).collect(),
        };
        self.frames_drawn += 1;
    }
}

fn frame_to_rgba(frame: &Frame) -> RgbaImage {
    match frame.to_rgb_image() {
        Some(rgb) => image::DynamicImage::ImageRgb8(rgb).to_rgba8(),
        None => RgbaImage::new(frame.width, frame.height),
    }
}

fn detection_line(detection: &Detection) -> String {
    format!("{} {:.0}%", detection.label, detection.confidence * 100.0)
}

fn entry_line(entry: &PredictionEntry) -> String {
    format!("{}: {:.0}%", entry.label, entry.confidence * 100.0)
}

/// Map normalized `[x0, y0, x1, y1]` onto pixel corners, clamped to the image.
///
/// Returns `None` for empty images and inverted boxes.
pub fn normalize_box(corners: [f32; 4], dims: (u32, u32)) -> Option<[u32; 4]> {
    let (w, h) = dims;
    if w == 0 || h == 0 {
        return None;
    }
    let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min((max - 1) as f32) as u32 };
    let x0 = clamp(corners[0] * w as f32, w);
    let y0 = clamp(corners[1] * h as f32, h);
    let x1 = clamp(corners[2] * w as f32, w);
    let y1 = clamp(corners[3] * h as f32, h);
    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some([x0, y0, x1, y1])
}

/// Draw a rectangle border `thickness` pixels wide, growing inward.
pub fn draw_rect(img: &mut RgbaImage, corners: [u32; 4], color: Rgba<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    let [x0, y0, x1, y1] = corners;
    for t in 0..thickness {
        let left = x0.saturating_add(t);
        let top = y0.saturating_add(t);
        let right = x1.saturating_sub(t);
        let bottom = y1.saturating_sub(t);
        if right >= w || bottom >= h || left > right || top > bottom {
            continue;
        }
        for x in left..=right {
            img.put_pixel(x, top, color);
            img.put_pixel(x, bottom, color);
        }
        for y in top..=bottom {
            img.put_pixel(left, y, color);
            img.put_pixel(right, y, color);
        }
    }
}
