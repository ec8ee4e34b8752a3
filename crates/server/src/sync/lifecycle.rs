// Room lifecycle: resolving and deleting issue rooms, one at a time or in
// bounded-concurrency batches. A room that is already gone counts as deleted.

use futures_util::{stream, StreamExt};
use roomsync_common::{
    room::{in_scope, is_issue_room, room_key, room_scope, RoomEntity, RoomKey},
    types::{CleanupReport, RoomOutcome},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    live::{DeleteOutcome, LiveStore, LiveStoreError},
    store::{CanonicalStore, StoreError},
};

pub const ISSUE_ROOMS: &str = "issue rooms";

/// Delete one room. Missing rooms are reported as `NotFound`, never as errors.
pub async fn delete_room(live: &LiveStore, room_id: &str) -> Result<DeleteOutcome, LiveStoreError> {
    let outcome = live.delete_room(room_id).await?;
    match outcome {
        DeleteOutcome::Deleted => info!(room_id, "deleted room"),
        DeleteOutcome::NotFound => info!(room_id, "room already absent"),
    }
    Ok(outcome)
}

/// Delete every room in `rooms` with at most `concurrency` requests in flight.
/// One outcome per room; a failing room never aborts the others.
pub async fn delete_rooms(
    live: &LiveStore,
    rooms: Vec<RoomKey>,
    concurrency: usize,
) -> Vec<RoomOutcome> {
    stream::iter(rooms)
        .map(|room| async move {
            match delete_room(live, room.as_str()).await {
                Ok(_) => RoomOutcome::deleted(room.into_string()),
                Err(error) => {
                    warn!(room_id = %room, error = %error, "room deletion failed");
                    RoomOutcome::failed(room.into_string(), error.to_string())
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

/// Find the room belonging to an issue.
///
/// The issue record's stored reference wins; otherwise the key is derived from
/// the supplied slugs. `None` when neither is available.
pub async fn resolve_issue_room(
    store: &CanonicalStore,
    issue_id: Uuid,
    workspace_slug: Option<&str>,
    space_slug: Option<&str>,
) -> Result<Option<RoomKey>, StoreError> {
    if let Some(reference) = store.issue_room_reference(issue_id).await? {
        return Ok(Some(reference));
    }

    Ok(workspace_slug.map(|slug| room_key(slug, RoomEntity::Issue(issue_id), space_slug)))
}

/// Scope segment restricting a bulk cleanup. A space slug wins over the
/// workspace slug, mirroring key derivation.
pub fn cleanup_scope(workspace_slug: Option<&str>, space_slug: Option<&str>) -> Option<String> {
    match (workspace_slug, space_slug.filter(|slug| !slug.is_empty())) {
        (_, Some(space)) => Some(room_scope("", Some(space))),
        (Some(workspace), None) => Some(room_scope(workspace, None)),
        (None, None) => None,
    }
}

/// Delete every issue room in the live store, optionally restricted to a set
/// of scopes. An empty set matches nothing. Project and wiki rooms are never
/// touched.
pub async fn purge_issue_rooms(
    live: &LiveStore,
    scopes: Option<&[String]>,
    concurrency: usize,
) -> Result<CleanupReport, LiveStoreError> {
    let rooms: Vec<RoomKey> = live
        .list_rooms()
        .await?
        .into_iter()
        .filter(|room| is_issue_room(room.as_str()))
        .filter(|room| {
            scopes.map_or(true, |scopes| scopes.iter().any(|scope| in_scope(room.as_str(), scope)))
        })
        .collect();

    info!(candidates = rooms.len(), scopes = ?scopes, "purging issue rooms");
    let report =
        CleanupReport::from_outcomes(ISSUE_ROOMS, delete_rooms(live, rooms, concurrency).await);
    info!(deleted = report.deleted, failed = report.failed, "issue room purge finished");

    Ok(report)
}
