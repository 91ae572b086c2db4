use std::sync::Arc;

use super::codec::{export_at, validate_examples};
use super::{
    DatasetExport, DatasetSnapshot, FeatureVector, KeyValueStore, LabelCounts,
    PersistenceWriter, TrainingExample, count_labels, decode_records,
};
use crate::error::{ClassifyError, Result};
use crate::status::StatusReporter;

enum Mutation {
    Append(TrainingExample),
    Replace(Vec<TrainingExample>),
    /// Same as `Replace` but the data came from the store, so nothing is written back.
    Restore(Vec<TrainingExample>),
    Clear,
}

struct Persistence {
    store: Arc<dyn KeyValueStore>,
    key: String,
    writer: PersistenceWriter,
}

/// Owner of the training dataset and its label counts.
///
/// Every change funnels through [`DatasetStore::apply`], which recomputes the label counts
/// and queues a best-effort save. The store assumes a single writer; readers take a
/// [`DatasetSnapshot`].
pub struct DatasetStore {
    examples: DatasetSnapshot,
    label_counts: LabelCounts,
    persistence: Option<Persistence>,
}

impl DatasetStore {
    /// A store that never touches persistent storage.
    pub fn in_memory() -> Self {
        Self {
            examples: Arc::new(Vec::new()),
            label_counts: LabelCounts::new(),
            persistence: None,
        }
    }

    /// A store that saves under `key` in `store` after every change.
    pub fn with_persistence(
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        status: StatusReporter,
    ) -> Self {
        let key = key.into();
        let writer = PersistenceWriter::spawn(store.clone(), key.clone(), status);
        Self {
            persistence: Some(Persistence { store, key, writer }),
            ..Self::in_memory()
        }
    }

    /// Append one example, returning the new dataset size.
    pub fn add_example(&mut self, label: &str, features: FeatureVector) -> Result<usize> {
        if label.trim().is_empty() {
            return Err(ClassifyError::InvalidLabel);
        }
        if let Some(expected) = self.feature_len() {
            if features.len() != expected {
                return Err(ClassifyError::DimensionMismatch {
                    expected,
                    actual: features.len(),
                });
            }
        }
        self.apply(Mutation::Append(TrainingExample::new(label, features)));
        Ok(self.examples.len())
    }

    /// Swap in a whole new dataset; on validation failure the store is left unchanged.
    pub fn replace(&mut self, examples: Vec<TrainingExample>) -> Result<()> {
        validate_examples(&examples)?;
        self.apply(Mutation::Replace(examples));
        Ok(())
    }

    /// Drop every example and the saved copy.
    pub fn clear(&mut self) {
        self.apply(Mutation::Clear);
    }

    /// Load the saved dataset, if any, returning the restored size.
    ///
    /// Malformed stored data fails with [`ClassifyError::CorruptDataset`] and leaves the
    /// in-memory dataset untouched.
    pub fn restore(&mut self) -> Result<usize> {
        let Some(persistence) = &self.persistence else {
            return Ok(self.examples.len());
        };
        let Some(bytes) = persistence.store.get(&persistence.key)? else {
            return Ok(self.examples.len());
        };
        let examples =
            decode_records(&bytes).map_err(|err| ClassifyError::CorruptDataset(err.to_string()))?;
        self.apply(Mutation::Restore(examples));
        tracing::info!("Restored {} training examples", self.examples.len());
        Ok(self.examples.len())
    }

    /// Serialize the dataset for download.
    pub fn export(&self) -> Result<DatasetExport> {
        export_at(&self.examples, crate::logging::now_local_or_utc())
    }

    /// Replace the dataset with the records in `bytes`; no partial import on failure.
    pub fn import(&mut self, bytes: &[u8]) -> Result<usize> {
        let examples = decode_records(bytes)?;
        self.apply(Mutation::Replace(examples));
        Ok(self.examples.len())
    }

    pub fn snapshot(&self) -> DatasetSnapshot {
        Arc::clone(&self.examples)
    }

    pub fn label_counts(&self) -> &LabelCounts {
        &self.label_counts
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Shared feature length, once the dataset has at least one example.
    pub fn feature_len(&self) -> Option<usize> {
        self.examples.first().map(|example| example.features().len())
    }

    /// Wait for queued saves to be written.
    pub fn flush(&self) {
        if let Some(persistence) = &self.persistence {
            persistence.writer.flush();
        }
    }

    fn apply(&mut self, mutation: Mutation) {
        let persist = match mutation {
            Mutation::Append(example) => {
                Arc::make_mut(&mut self.examples).push(example);
                true
            }
            Mutation::Replace(examples) => {
                self.examples = Arc::new(examples);
                true
            }
            Mutation::Restore(examples) => {
                self.examples = Arc::new(examples);
                false
            }
            Mutation::Clear => {
                self.examples = Arc::new(Vec::new());
                true
            }
        };
        self.label_counts = count_labels(&self.examples);
        if !persist {
            return;
        }
        if let Some(persistence) = &self.persistence {
            if self.examples.is_empty() {
                persistence.writer.remove();
            } else {
                persistence.writer.save(self.snapshot());
            }
        }
    }
}

impl Default for DatasetStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
