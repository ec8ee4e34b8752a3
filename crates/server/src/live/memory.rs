// In-process live store holding one `RoomDoc` per room.

use std::collections::{BTreeMap, HashSet};

use roomsync_common::{document::RoomDoc, room::RoomKey};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{DeleteOutcome, LiveStoreError};

#[derive(Default)]
pub struct MemoryLiveStore {
    rooms: RwLock<BTreeMap<String, RoomDoc>>,
    failing_deletes: RwLock<HashSet<String>>,
    listing_unavailable: RwLock<bool>,
}

impl MemoryLiveStore {
    /// Open a room, creating it with the default tree on first use.
    pub async fn open(&self, room_id: &str) {
        self.rooms.write().await.entry(room_id.to_owned()).or_insert_with(RoomDoc::initialized);
    }

    pub async fn insert(&self, room_id: &str, doc: RoomDoc) {
        self.rooms.write().await.insert(room_id.to_owned(), doc);
    }

    /// Run `edit` against an open room. Returns `None` for unknown rooms.
    pub async fn edit<R>(&self, room_id: &str, edit: impl FnOnce(&RoomDoc) -> R) -> Option<R> {
        self.rooms.read().await.get(room_id).map(edit)
    }

    pub async fn contains(&self, room_id: &str) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }

    pub async fn room_ids(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }

    /// Make every later deletion of `room_id` fail.
    pub async fn fail_deletes_for(&self, room_id: &str) {
        self.failing_deletes.write().await.insert(room_id.to_owned());
    }

    pub async fn set_listing_unavailable(&self, unavailable: bool) {
        *self.listing_unavailable.write().await = unavailable;
    }

    pub(super) async fn list_rooms(&self) -> Result<Vec<RoomKey>, LiveStoreError> {
        if *self.listing_unavailable.read().await {
            return Err(LiveStoreError::Unavailable("room listing disabled".to_owned()));
        }
        Ok(self.rooms.read().await.keys().cloned().map(RoomKey::new).collect())
    }

    pub(super) async fn snapshot(&self, room_id: &str) -> Result<Option<Value>, LiveStoreError> {
        Ok(self.rooms.read().await.get(room_id).map(RoomDoc::snapshot))
    }

    pub(super) async fn delete_room(&self, room_id: &str) -> Result<DeleteOutcome, LiveStoreError> {
        if self.failing_deletes.read().await.contains(room_id) {
            return Err(LiveStoreError::Unavailable(format!("deletion of {room_id} rejected")));
        }
        match self.rooms.write().await.remove(room_id) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::NotFound),
        }
    }
}
