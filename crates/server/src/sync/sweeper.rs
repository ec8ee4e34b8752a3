// Orphan sweep: delete issue rooms that no issue record references anymore.
//
// Candidates are computed from complete listings of both stores; if either
// listing fails nothing is deleted.

use std::collections::HashSet;

use roomsync_common::{
    room::{is_issue_room, RoomKey},
    types::CleanupReport,
};
use thiserror::Error;
use tracing::info;

use crate::{
    live::{LiveStore, LiveStoreError},
    store::{CanonicalStore, StoreError},
    sync::lifecycle::delete_rooms,
};

pub const ORPHANED_ROOMS: &str = "orphaned rooms";

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("failed to list live rooms: {0}")]
    Live(#[from] LiveStoreError),
    #[error("failed to list issue room references: {0}")]
    Store(#[from] StoreError),
}

/// Issue rooms present in `live_rooms` but absent from `references`.
pub fn orphan_candidates(live_rooms: Vec<RoomKey>, references: &HashSet<String>) -> Vec<RoomKey> {
    live_rooms
        .into_iter()
        .filter(|room| is_issue_room(room.as_str()))
        .filter(|room| !references.contains(room.as_str()))
        .collect()
}

pub async fn sweep_orphans(
    live: &LiveStore,
    store: &CanonicalStore,
    concurrency: usize,
) -> Result<CleanupReport, SweepError> {
    let live_rooms = live.list_rooms().await?;
    let references = store.room_references().await?;
    let listed = live_rooms.len();

    let candidates = orphan_candidates(live_rooms, &references);
    info!(listed, referenced = references.len(), orphans = candidates.len(), "orphan sweep started");

    let report =
        CleanupReport::from_outcomes(ORPHANED_ROOMS, delete_rooms(live, candidates, concurrency).await);
    info!(deleted = report.deleted, failed = report.failed, "orphan sweep finished");

    Ok(report)
}
