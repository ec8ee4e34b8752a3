// Live collaboration store: the system of record for room documents.
//
// Every caller receives the store as a parameter; nothing here is global.

pub mod http;
pub mod memory;

use std::sync::Arc;

use roomsync_common::room::RoomKey;
use serde_json::Value;
use thiserror::Error;

use crate::config::{LiveBackend, LiveStoreConfig};

pub use self::{http::HostedLiveStore, memory::MemoryLiveStore};

#[derive(Debug, Error)]
pub enum LiveStoreError {
    #[error("live store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("live store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("live store response could not be decoded: {0}")]
    Decode(String),
    #[error("live store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The room was already gone.
    NotFound,
}

#[derive(Clone)]
pub enum LiveStore {
    Http(Arc<HostedLiveStore>),
    Memory(Arc<MemoryLiveStore>),
}

impl LiveStore {
    pub fn from_config(config: &LiveStoreConfig) -> anyhow::Result<Self> {
        match config.backend {
            LiveBackend::Http => Ok(Self::Http(Arc::new(HostedLiveStore::new(config)?))),
            LiveBackend::Memory => Ok(Self::Memory(Arc::new(MemoryLiveStore::default()))),
        }
    }

    pub fn memory() -> (Self, Arc<MemoryLiveStore>) {
        let store = Arc::new(MemoryLiveStore::default());
        (Self::Memory(Arc::clone(&store)), store)
    }

    /// Every room currently held by the store.
    pub async fn list_rooms(&self) -> Result<Vec<RoomKey>, LiveStoreError> {
        match self {
            Self::Http(client) => client.list_rooms().await,
            Self::Memory(store) => store.list_rooms().await,
        }
    }

    /// Plain JSON snapshot of a room's document, or `None` when the room does
    /// not exist.
    pub async fn snapshot(&self, room_id: &str) -> Result<Option<Value>, LiveStoreError> {
        match self {
            Self::Http(client) => client.snapshot(room_id).await,
            Self::Memory(store) => store.snapshot(room_id).await,
        }
    }

    pub async fn delete_room(&self, room_id: &str) -> Result<DeleteOutcome, LiveStoreError> {
        match self {
            Self::Http(client) => client.delete_room(room_id).await,
            Self::Memory(store) => store.delete_room(room_id).await,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Memory(_) => "memory",
        }
    }
}
