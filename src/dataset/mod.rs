//! Labeled feature-vector dataset used to train the nearest-neighbour classifier.

mod codec;
mod kv;
mod persist;
mod store;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use codec::{
    DATASET_CONTENT_TYPE, DatasetExport, decode_records, encode_records, export_file_name,
};
pub use kv::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore, StoreError};
pub use persist::PersistenceWriter;
pub use store::DatasetStore;

/// Fixed-length embedding produced by a feature extractor.
pub type FeatureVector = Vec<f32>;

/// Immutable view of the dataset; stays valid even after the store mutates.
pub type DatasetSnapshot = Arc<Vec<TrainingExample>>;

/// Label → number of examples carrying it.
pub type LabelCounts = BTreeMap<String, usize>;

/// One labeled feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    label: String,
    features: FeatureVector,
}

impl TrainingExample {
    pub fn new(label: impl Into<String>, features: FeatureVector) -> Self {
        Self {
            label: label.into(),
            features,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn features(&self) -> &[f32] {
        &self.features
    }
}

/// Count examples per label.
pub fn count_labels(examples: &[TrainingExample]) -> LabelCounts {
    let mut counts = LabelCounts::new();
    for example in examples {
        *counts.entry(example.label.clone()).or_default() += 1;
    }
    counts
}
