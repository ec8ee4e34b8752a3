// Metadata projection: the flattened, rebuildable summary of a room document
// stored in the relational store for listing and filtering.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::document::{
    ASSIGNED_TO, DEFAULT_TITLE, LABELS, META, NONE_VALUE, PRIORITY, PROGRESS, PROJECT,
    PROPERTIES, SPACE, TITLE,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataProjection {
    pub title: String,
    pub progress: String,
    pub priority: String,
    /// Single legacy assignee, or `"none"`.
    pub assigned_to: String,
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("room document has no `meta` field")]
    MissingMeta,
}

/// Derive the projection from a document snapshot.
///
/// Every field is recomputed from the snapshot, so the same snapshot always
/// yields the same projection.
pub fn project_snapshot(snapshot: &Value) -> Result<MetadataProjection, ProjectionError> {
    let meta = snapshot.get(META).filter(|meta| meta.is_object()).ok_or(ProjectionError::MissingMeta)?;
    let properties = snapshot.get(PROPERTIES);

    let title = meta.get(TITLE).and_then(value_text).unwrap_or_else(|| DEFAULT_TITLE.to_owned());
    let progress = property_or_none(properties, PROGRESS);
    let priority = property_or_none(properties, PRIORITY);
    let assigned_to = normalize_assignee(properties.and_then(|props| props.get(ASSIGNED_TO)));
    let labels = snapshot
        .get(LABELS)
        .and_then(Value::as_array)
        .map(|labels| labels.iter().filter_map(value_text).collect())
        .unwrap_or_default();

    Ok(MetadataProjection {
        title,
        progress,
        priority,
        assigned_to,
        labels,
        space: back_reference(snapshot, meta, SPACE),
        project: back_reference(snapshot, meta, PROJECT),
    })
}

/// Collapse the live `assignedTo` value into the legacy single-assignee field.
///
/// - non-empty list → first element
/// - empty list, null or absent → `"none"`
/// - legacy scalar → unchanged
pub fn normalize_assignee(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => {
            items.first().and_then(value_text).unwrap_or_else(|| NONE_VALUE.to_owned())
        }
        Some(scalar) => value_text(scalar).unwrap_or_else(|| NONE_VALUE.to_owned()),
        None => NONE_VALUE.to_owned(),
    }
}

fn property_or_none(properties: Option<&Value>, key: &str) -> String {
    properties
        .and_then(|props| props.get(key))
        .and_then(value_text)
        .unwrap_or_else(|| NONE_VALUE.to_owned())
}

// Hosted stores keep back-references at the root; yrs documents keep them in `meta`.
fn back_reference(snapshot: &Value, meta: &Value, key: &str) -> Option<String> {
    snapshot.get(key).and_then(value_text).or_else(|| meta.get(key).and_then(value_text))
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
