//! Exact k-nearest-neighbour voting over the training dataset.
//!
//! Distances are plain Euclidean with no approximation or early exit, and every sort is
//! stable, so identical inputs always produce identical rankings.

use crate::dataset::TrainingExample;
use crate::error::{ClassifyError, Result};
use crate::predict::PredictionEntry;

struct Neighbour<'a> {
    label: &'a str,
    distance: f32,
}

/// Rank labels by their share of votes among the `k` nearest examples.
///
/// Confidence is `votes / min(k, dataset.len())`. Distance ties keep dataset order and
/// confidence ties keep first-appearance order among the neighbours. An empty dataset
/// yields an empty ranking; `k` below one is treated as one.
pub fn classify(
    query: &[f32],
    dataset: &[TrainingExample],
    k: usize,
) -> Result<Vec<PredictionEntry>> {
    if dataset.is_empty() {
        return Ok(Vec::new());
    }
    let mut neighbours = Vec::with_capacity(dataset.len());
    for example in dataset {
        neighbours.push(Neighbour {
            label: example.label(),
            distance: euclidean_distance(query, example.features())?,
        });
    }
    neighbours.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    let effective_k = k.max(1).min(neighbours.len());
    let mut votes: Vec<(&str, usize)> = Vec::new();
    for neighbour in &neighbours[..effective_k] {
        match votes.iter_mut().find(|(label, _)| *label == neighbour.label) {
            Some((_, count)) => *count += 1,
            None => votes.push((neighbour.label, 1)),
        }
    }
    votes.sort_by(|a, b| b.1.cmp(&a.1));

    Ok(votes
        .into_iter()
        .map(|(label, count)| PredictionEntry::new(label, count as f32 / effective_k as f32))
        .collect())
}

/// Square root of the summed squared differences.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(ClassifyError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let sum: f32 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum();
    Ok(sum.sqrt())
}
