use std::sync::{Arc, RwLock};

use crate::predict::PredictionEntry;

/// Latest ranked custom-model predictions, replaced wholesale by the background loop.
///
/// Writers build a complete slice first and then swap the pointer, so a reader holding a
/// snapshot never observes a partially written list.
#[derive(Debug)]
pub struct PredictionCache {
    current: RwLock<Arc<[PredictionEntry]>>,
}

impl Default for PredictionCache {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::from(Vec::new())),
        }
    }
}

impl PredictionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, entries: Vec<PredictionEntry>) {
        let entries: Arc<[PredictionEntry]> = Arc::from(entries);
        match self.current.write() {
            Ok(mut current) => *current = entries,
            Err(poisoned) => *poisoned.into_inner() = entries,
        }
    }

    pub fn clear(&self) {
        self.replace(Vec::new());
    }

    pub fn snapshot(&self) -> Arc<[PredictionEntry]> {
        match self.current.read() {
            Ok(current) => Arc::clone(&current),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}
