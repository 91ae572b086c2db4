use std::sync::Arc;

use super::*;
use crate::error::ClassifyError;
use crate::status::{StatusReporter, StatusTone};

const KEY: &str = "knn_dataset_v1";

fn persisted_store(kv: &Arc<MemoryKeyValueStore>) -> DatasetStore {
    DatasetStore::with_persistence(kv.clone(), KEY, StatusReporter::silent())
}

struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk full".into()))
    }

    fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

#[test]
fn add_example_updates_label_counts() {
    let mut store = DatasetStore::in_memory();
    store.add_example("pen", vec![0.0, 0.0]).unwrap();
    store.add_example("cup", vec![10.0, 10.0]).unwrap();
    assert_eq!(store.add_example("pen", vec![1.0, 0.0]).unwrap(), 3);
    assert_eq!(store.label_counts().get("pen"), Some(&2));
    assert_eq!(store.label_counts().get("cup"), Some(&1));
    assert_eq!(store.feature_len(), Some(2));
}

#[test]
fn empty_label_is_rejected() {
    let mut store = DatasetStore::in_memory();
    let err = store.add_example("  ", vec![1.0]).unwrap_err();
    assert!(matches!(err, ClassifyError::InvalidLabel));
    assert!(store.is_empty());
}

#[test]
fn mismatched_length_leaves_dataset_and_counts_unchanged() {
    let mut store = DatasetStore::in_memory();
    store.add_example("pen", vec![0.0, 0.0]).unwrap();
    let before = store.snapshot();
    let counts_before = store.label_counts().clone();

    let err = store.add_example("cup", vec![1.0, 2.0, 3.0]).unwrap_err();

    assert!(matches!(
        err,
        ClassifyError::DimensionMismatch {
            expected: 2,
            actual: 3
        }
    ));
    assert_eq!(store.snapshot(), before);
    assert_eq!(store.label_counts(), &counts_before);
}

#[test]
fn snapshots_are_stable_across_mutation() {
    let mut store = DatasetStore::in_memory();
    store.add_example("pen", vec![0.0]).unwrap();
    let snapshot = store.snapshot();
    store.add_example("cup", vec![1.0]).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(store.snapshot().len(), 2);
}

#[test]
fn replace_reports_offending_indices_and_keeps_old_data() {
    let mut store = DatasetStore::in_memory();
    store.add_example("keep", vec![5.0, 5.0]).unwrap();

    let err = store
        .replace(vec![
            TrainingExample::new("a", vec![1.0, 2.0]),
            TrainingExample::new("", vec![1.0, 2.0]),
            TrainingExample::new("c", vec![]),
            TrainingExample::new("d", vec![1.0]),
        ])
        .unwrap_err();

    match err {
        ClassifyError::InvalidDataset { indices, .. } => assert_eq!(indices, vec![1, 2, 3]),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(store.len(), 1);
    assert_eq!(store.snapshot()[0].label(), "keep");
}

#[test]
fn replace_swaps_dataset_and_recounts() {
    let mut store = DatasetStore::in_memory();
    store.add_example("old", vec![0.0]).unwrap();
    store
        .replace(vec![
            TrainingExample::new("x", vec![1.0, 1.0]),
            TrainingExample::new("x", vec![2.0, 2.0]),
        ])
        .unwrap();
    assert_eq!(store.label_counts().len(), 1);
    assert_eq!(store.label_counts().get("x"), Some(&2));
    assert_eq!(store.feature_len(), Some(2));
}

#[test]
fn export_then_import_round_trips_in_order() {
    let mut source = DatasetStore::in_memory();
    source.add_example("pen", vec![0.0, 0.5]).unwrap();
    source.add_example("cup", vec![10.0, 10.25]).unwrap();
    source.add_example("pen", vec![-1.0, 3.0]).unwrap();

    let export = source.export().unwrap();
    assert_eq!(export.content_type, DATASET_CONTENT_TYPE);
    assert!(export.file_name.starts_with("livelabel-dataset_"));
    assert!(export.file_name.ends_with(".json"));

    let mut target = DatasetStore::in_memory();
    assert_eq!(target.import(&export.bytes).unwrap(), 3);
    assert_eq!(target.snapshot(), source.snapshot());
    assert_eq!(target.label_counts(), source.label_counts());
}

#[test]
fn import_rejects_bad_records_without_partial_import() {
    let mut store = DatasetStore::in_memory();
    store.add_example("keep", vec![1.0]).unwrap();
    let bytes = br#"[
        {"label": "ok", "features": [1.0]},
        {"features": [2.0]},
        {"label": "no-features"},
        {"label": 7, "features": [1.0]}
    ]"#;

    let err = store.import(bytes).unwrap_err();

    match err {
        ClassifyError::InvalidDataset { indices, .. } => assert_eq!(indices, vec![1, 2, 3]),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(store.snapshot()[0].label(), "keep");
}

#[test]
fn import_rejects_non_array_payload() {
    let mut store = DatasetStore::in_memory();
    let err = store.import(b"{\"label\": \"x\"}").unwrap_err();
    assert!(matches!(err, ClassifyError::InvalidDataset { ref indices, .. } if indices.is_empty()));
}

#[test]
fn export_file_name_uses_timestamp() {
    let fixed = time::OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
    assert_eq!(
        export_file_name(fixed),
        "livelabel-dataset_2023-11-14_22-13-20.json"
    );
}

#[test]
fn additions_are_persisted_and_restored() {
    let kv = Arc::new(MemoryKeyValueStore::new());
    {
        let mut store = persisted_store(&kv);
        store.add_example("pen", vec![0.0, 0.0]).unwrap();
        store.add_example("cup", vec![10.0, 10.0]).unwrap();
        store.flush();
    }

    let mut reopened = persisted_store(&kv);
    assert_eq!(reopened.restore().unwrap(), 2);
    assert_eq!(reopened.snapshot()[1].label(), "cup");
    assert_eq!(reopened.label_counts().get("pen"), Some(&1));
}

#[test]
fn clear_removes_persisted_copy() {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let mut store = persisted_store(&kv);
    store.add_example("pen", vec![0.0]).unwrap();
    store.flush();
    assert!(kv.get(KEY).unwrap().is_some());

    store.clear();
    store.flush();

    assert!(store.is_empty());
    assert!(store.label_counts().is_empty());
    assert!(kv.get(KEY).unwrap().is_none());
}

#[test]
fn corrupt_persisted_data_leaves_memory_untouched() {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let mut store = persisted_store(&kv);
    store.add_example("pen", vec![0.0]).unwrap();
    store.flush();
    kv.set(KEY, b"not json").unwrap();

    let err = store.restore().unwrap_err();

    assert!(matches!(err, ClassifyError::CorruptDataset(_)));
    assert_eq!(store.len(), 1);
}

#[test]
fn persistence_failure_is_reported_without_rollback() {
    let (status, rx) = StatusReporter::channel();
    let mut store = DatasetStore::with_persistence(Arc::new(FailingStore), KEY, status);

    store.add_example("pen", vec![0.0]).unwrap();
    store.flush();

    assert_eq!(store.len(), 1);
    let warning = rx.try_iter().find(|msg| msg.tone == StatusTone::Warning);
    assert!(warning.is_some_and(|msg| msg.text.contains("disk full")));
}

#[test]
fn sqlite_backed_store_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let kv = Arc::new(SqliteKeyValueStore::open(&dir.path().join("livelabel.db")).unwrap());
    {
        let mut store =
            DatasetStore::with_persistence(kv.clone(), KEY, StatusReporter::silent());
        store.add_example("pen", vec![0.25, 0.75]).unwrap();
        store.flush();
    }
    let mut store = DatasetStore::with_persistence(kv, KEY, StatusReporter::silent());
    assert_eq!(store.restore().unwrap(), 1);
    assert_eq!(store.snapshot()[0].features(), &[0.25, 0.75]);
}
