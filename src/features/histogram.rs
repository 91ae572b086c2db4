use std::sync::Arc;

use super::{ExtractorLoader, FeatureExtractor};
use crate::dataset::FeatureVector;
use crate::error::{ClassifyError, Result};
use crate::frame::Frame;

const DEFAULT_BINS: usize = 8;
const MAX_BINS: usize = 256;
const GRID: usize = 4;

/// Deterministic colour descriptor: per-channel histograms plus a coarse grid of mean
/// colours, L2-normalized.
#[derive(Debug, Clone)]
pub struct ColorHistogramExtractor {
    bins: usize,
}

impl ColorHistogramExtractor {
    /// `bins` is clamped to `1..=256`, one bin per channel value at most.
    pub fn new(bins: usize) -> Self {
        Self {
            bins: bins.clamp(1, MAX_BINS),
        }
    }
}

impl Default for ColorHistogramExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_BINS)
    }
}

impl FeatureExtractor for ColorHistogramExtractor {
    fn name(&self) -> &str {
        "color-histogram"
    }

    fn feature_len(&self) -> usize {
        3 * self.bins + 3 * GRID * GRID
    }

    fn extract(&self, frame: &Frame) -> Result<FeatureVector> {
        if !frame.is_ready() {
            return Err(ClassifyError::inference("frame is empty or truncated"));
        }
        let width = frame.width as usize;
        let height = frame.height as usize;

        let mut histogram = vec![0.0f32; 3 * self.bins];
        let mut cell_sums = vec![0.0f32; 3 * GRID * GRID];
        let mut cell_counts = vec![0u32; GRID * GRID];
        for (index, pixel) in frame.data.chunks_exact(3).enumerate() {
            let x = index % width;
            let y = index / width;
            let cell = (y * GRID / height) * GRID + x * GRID / width;
            cell_counts[cell] += 1;
            for (channel, value) in pixel.iter().enumerate() {
                let bin = usize::from(*value) * self.bins / 256;
                histogram[channel * self.bins + bin] += 1.0;
                cell_sums[cell * 3 + channel] += f32::from(*value) / 255.0;
            }
        }

        let pixels = (width * height) as f32;
        for value in histogram.iter_mut() {
            *value /= pixels;
        }
        for (cell, count) in cell_counts.iter().enumerate() {
            if *count > 0 {
                for channel in 0..3 {
                    cell_sums[cell * 3 + channel] /= *count as f32;
                }
            }
        }
        histogram.extend(cell_sums);
        normalize_l2_in_place(&mut histogram);
        Ok(histogram)
    }
}

fn normalize_l2_in_place(values: &mut [f32]) {
    let norm = values.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in values.iter_mut() {
            *value /= norm;
        }
    }
}

/// Loader for the built-in extractor; never fails.
#[derive(Debug, Clone, Default)]
pub struct HistogramExtractorLoader {
    pub bins: Option<usize>,
}

impl ExtractorLoader for HistogramExtractorLoader {
    fn load(&self) -> Result<Arc<dyn FeatureExtractor>> {
        let extractor = match self.bins {
            Some(bins) => ColorHistogramExtractor::new(bins),
            None => ColorHistogramExtractor::default(),
        };
        Ok(Arc::new(extractor))
    }
}
