//! JSON record encoding shared by persistence and file import/export.

use serde::Deserialize;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

use super::TrainingExample;
use crate::error::{ClassifyError, Result};

/// Content type attached to exported datasets.
pub const DATASET_CONTENT_TYPE: &str = "application/json";
const EXPORT_FILE_PREFIX: &str = "livelabel-dataset";

/// Serialized dataset ready to be handed to a download or save dialog.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetExport {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    /// Timestamp-derived name suggested to the user.
    pub file_name: String,
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    features: Option<Vec<f32>>,
}

/// Encode examples as a JSON array of `{label, features}` records.
pub fn encode_records(examples: &[TrainingExample]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(examples)?)
}

/// Decode and validate a JSON array of `{label, features}` records.
///
/// Nothing is returned unless every record is valid; the error lists each offending
/// record index.
pub fn decode_records(bytes: &[u8]) -> Result<Vec<TrainingExample>> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(bytes).map_err(|err| {
        ClassifyError::invalid_dataset(
            Vec::new(),
            format!("expected a JSON array of records ({err})"),
        )
    })?;
    let mut examples = Vec::with_capacity(values.len());
    let mut offending = Vec::new();
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<RawRecord>(value) {
            Ok(RawRecord {
                label: Some(label),
                features: Some(features),
            }) => examples.push(TrainingExample::new(label, features)),
            _ => offending.push(index),
        }
    }
    if !offending.is_empty() {
        return Err(ClassifyError::invalid_dataset(
            offending,
            "records need a string `label` and a numeric `features` array",
        ));
    }
    validate_examples(&examples)?;
    Ok(examples)
}

/// Check labels are non-empty and every feature vector is non-empty and equally long.
pub(super) fn validate_examples(examples: &[TrainingExample]) -> Result<()> {
    let expected_len = examples
        .iter()
        .map(|example| example.features().len())
        .find(|len| *len > 0);
    let offending: Vec<usize> = examples
        .iter()
        .enumerate()
        .filter(|(_, example)| {
            example.label().trim().is_empty()
                || example.features().is_empty()
                || Some(example.features().len()) != expected_len
        })
        .map(|(index, _)| index)
        .collect();
    if offending.is_empty() {
        return Ok(());
    }
    Err(ClassifyError::invalid_dataset(
        offending,
        "labels must be non-empty and feature vectors non-empty with a shared length",
    ))
}

/// Build an export bundle for `examples` stamped with `now`.
pub(super) fn export_at(
    examples: &[TrainingExample],
    now: OffsetDateTime,
) -> Result<DatasetExport> {
    Ok(DatasetExport {
        bytes: serde_json::to_vec_pretty(examples)?,
        content_type: DATASET_CONTENT_TYPE,
        file_name: export_file_name(now),
    })
}

/// Suggested export file name, e.g. `livelabel-dataset_2026-10-17_09-30-00.json`.
pub fn export_file_name(now: OffsetDateTime) -> String {
    const NAME_FORMAT: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    match now.format(NAME_FORMAT) {
        Ok(stamp) => format!("{EXPORT_FILE_PREFIX}_{stamp}.json"),
        Err(_) => format!("{EXPORT_FILE_PREFIX}_{}.json", now.unix_timestamp()),
    }
}
