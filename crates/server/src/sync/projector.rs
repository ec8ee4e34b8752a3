// Metadata projector: read a room's document from the live store, flatten it
// and upsert the result into the relational store.

use roomsync_common::projection::{project_snapshot, MetadataProjection};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    live::{LiveStore, LiveStoreError},
    store::{CanonicalStore, StoreError},
};

#[derive(Debug, Error)]
pub enum ProjectorError {
    #[error("room {room_id} has no document to project")]
    DocumentNotFound { room_id: String },
    #[error(transparent)]
    Live(#[from] LiveStoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Project one room. Running it twice over an unchanged document writes the
/// same projection twice.
pub async fn project_room(
    live: &LiveStore,
    store: &CanonicalStore,
    room_id: &str,
) -> Result<MetadataProjection, ProjectorError> {
    let Some(snapshot) = live.snapshot(room_id).await? else {
        debug!(room_id, "live store has no such room");
        return Err(ProjectorError::DocumentNotFound { room_id: room_id.to_owned() });
    };

    let projection = project_snapshot(&snapshot)
        .map_err(|_| ProjectorError::DocumentNotFound { room_id: room_id.to_owned() })?;

    store.upsert_projection(room_id, &projection).await?;
    info!(
        room_id,
        title = %projection.title,
        progress = %projection.progress,
        labels = projection.labels.len(),
        "projected room metadata"
    );

    Ok(projection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn projects_open_room_into_store() {
        let (live, rooms) = LiveStore::memory();
        let (store, _) = CanonicalStore::memory();
        rooms.open("tracker-acme-wiki").await;
        rooms
            .edit("tracker-acme-wiki", |doc| {
                doc.set_title("Runbook");
                doc.set_progress("in_progress");
                doc.assign("user-1");
                doc.add_label("label-1");
            })
            .await;

        let projection = project_room(&live, &store, "tracker-acme-wiki").await.unwrap();

        assert_eq!(projection.title, "Runbook");
        assert_eq!(projection.assigned_to, "user-1");
        assert_eq!(projection.labels, vec!["label-1"]);
        let stored = store.projection("tracker-acme-wiki").await.unwrap().unwrap();
        assert_eq!(stored.metadata, projection);
    }

    #[tokio::test]
    async fn reprojection_is_idempotent() {
        let (live, rooms) = LiveStore::memory();
        let (store, _) = CanonicalStore::memory();
        rooms.open("tracker-acme-wiki").await;

        let first = project_room(&live, &store, "tracker-acme-wiki").await.unwrap();
        let second = project_room(&live, &store, "tracker-acme-wiki").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&store.projection("tracker-acme-wiki").await.unwrap().unwrap().metadata)
                .unwrap()
        );
    }

    #[tokio::test]
    async fn missing_room_or_meta_is_document_not_found() {
        let (live, rooms) = LiveStore::memory();
        let (store, _) = CanonicalStore::memory();
        rooms.insert("tracker-acme-blank", roomsync_common::document::RoomDoc::new()).await;

        assert!(matches!(
            project_room(&live, &store, "tracker-acme-missing").await,
            Err(ProjectorError::DocumentNotFound { .. })
        ));
        assert!(matches!(
            project_room(&live, &store, "tracker-acme-blank").await,
            Err(ProjectorError::DocumentNotFound { .. })
        ));
        assert!(store.projection("tracker-acme-blank").await.unwrap().is_none());
    }
}
