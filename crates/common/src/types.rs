// Shared report and request types exchanged between the server and the CLI.

use serde::{Deserialize, Serialize};

use crate::projection::MetadataProjection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomOutcomeStatus {
    Deleted,
    Error,
}

/// Result of deleting one room inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomOutcome {
    pub room_id: String,
    pub status: RoomOutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RoomOutcome {
    pub fn deleted(room_id: impl Into<String>) -> Self {
        Self { room_id: room_id.into(), status: RoomOutcomeStatus::Deleted, error: None }
    }

    pub fn failed(room_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            status: RoomOutcomeStatus::Error,
            error: Some(error.into()),
        }
    }
}

/// Aggregate outcome of a sweep or bulk deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// True when no room failed.
    pub success: bool,
    pub message: String,
    pub total: usize,
    pub deleted: usize,
    pub failed: usize,
    pub results: Vec<RoomOutcome>,
}

impl CleanupReport {
    /// Build the report once every item outcome is known. Results are sorted
    /// by room id.
    pub fn from_outcomes(subject: &str, mut results: Vec<RoomOutcome>) -> Self {
        results.sort_by(|left, right| left.room_id.cmp(&right.room_id));
        let total = results.len();
        let deleted =
            results.iter().filter(|outcome| outcome.status == RoomOutcomeStatus::Deleted).count();
        let failed = total - deleted;

        let message = if total == 0 {
            format!("no {subject} found")
        } else if failed == 0 {
            format!("deleted {deleted} {subject}")
        } else {
            format!("deleted {deleted} of {total} {subject}; {failed} failed")
        };

        Self { success: failed == 0, message, total, deleted, failed, results }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncRequest {
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncResponse {
    pub room_id: String,
    pub metadata: MetadataProjection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRoomRequest {
    #[serde(default)]
    pub issue_id: Option<String>,
    #[serde(default)]
    pub workspace_slug: Option<String>,
    #[serde(default)]
    pub space_slug: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRoomResponse {
    pub success: bool,
    #[serde(rename = "roomId")]
    pub room_id: String,
}

/// Optional scope restriction for bulk issue-room cleanup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupScopeRequest {
    #[serde(default)]
    pub workspace_slug: Option<String>,
    #[serde(default)]
    pub space_slug: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn report_counts_are_computed_from_outcomes() {
        let report = CleanupReport::from_outcomes(
            "orphaned rooms",
            vec![RoomOutcome::failed("x", "boom"), RoomOutcome::deleted("y")],
        );

        assert!(!report.success);
        assert_eq!((report.total, report.deleted, report.failed), (2, 1, 1));
        assert_eq!(report.results[0].room_id, "x");
        assert_eq!(report.message, "deleted 1 of 2 orphaned rooms; 1 failed");
    }

    #[test]
    fn empty_report_is_successful() {
        let report = CleanupReport::from_outcomes("issue rooms", vec![]);
        assert!(report.success);
        assert_eq!(report.message, "no issue rooms found");
    }

    #[test]
    fn outcome_wire_shape() {
        let value = serde_json::to_value(RoomOutcome::failed("room-1", "timeout")).expect("json");
        assert_eq!(value, json!({ "roomId": "room-1", "status": "error", "error": "timeout" }));

        let value = serde_json::to_value(RoomOutcome::deleted("room-2")).expect("json");
        assert_eq!(value, json!({ "roomId": "room-2", "status": "deleted" }));
    }
}
