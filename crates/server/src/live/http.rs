// REST client for a hosted live store.
//
// Routes, relative to the configured base URL:
//   GET    v2/rooms?limit=&startingAfter=   -> { data: [{ id }], nextCursor }
//   GET    v2/rooms/{id}/storage?format=json -> plain JSON document
//   DELETE v2/rooms/{id}                     -> 2xx, or 404 when absent
// Requests carry the secret key as a bearer token.

use anyhow::{bail, Context};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use roomsync_common::room::RoomKey;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{DeleteOutcome, LiveStoreError};
use crate::config::LiveStoreConfig;

const PAGE_SIZE: &str = "100";
const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomPage {
    data: Vec<RoomEntry>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoomEntry {
    id: String,
}

pub struct HostedLiveStore {
    http: Client,
    base_url: Url,
    secret_key: Option<String>,
}

impl HostedLiveStore {
    pub fn new(config: &LiveStoreConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("invalid live store base url `{}`", config.base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("live store base url `{}` cannot carry a path", config.base_url);
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build live store http client")?;

        Ok(Self { http, base_url, secret_key: config.secret_key.clone() })
    }

    pub(super) async fn list_rooms(&self) -> Result<Vec<RoomKey>, LiveStoreError> {
        let mut rooms = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut url = self.endpoint(&["v2", "rooms"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("limit", PAGE_SIZE);
                if let Some(cursor) = &cursor {
                    query.append_pair("startingAfter", cursor);
                }
            }

            let response = self.authorized(self.http.get(url)).send().await?;
            let page: RoomPage = ensure_success(response)
                .await?
                .json()
                .await
                .map_err(|error| LiveStoreError::Decode(error.to_string()))?;
            rooms.extend(page.data.into_iter().map(|room| RoomKey::new(room.id)));

            match page.next_cursor.filter(|next| !next.is_empty()) {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => break,
            }
        }

        tracing::debug!(rooms = rooms.len(), "listed live store rooms");
        Ok(rooms)
    }

    pub(super) async fn snapshot(&self, room_id: &str) -> Result<Option<Value>, LiveStoreError> {
        let mut url = self.endpoint(&["v2", "rooms", room_id, "storage"])?;
        url.query_pairs_mut().append_pair("format", "json");

        let response = self.authorized(self.http.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let snapshot = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|error| LiveStoreError::Decode(error.to_string()))?;
        Ok(Some(snapshot))
    }

    pub(super) async fn delete_room(&self, room_id: &str) -> Result<DeleteOutcome, LiveStoreError> {
        let url = self.endpoint(&["v2", "rooms", room_id])?;

        let response = self.authorized(self.http.delete(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(DeleteOutcome::NotFound);
        }

        ensure_success(response).await?;
        Ok(DeleteOutcome::Deleted)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, LiveStoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| LiveStoreError::Decode("base url cannot carry a path".to_owned()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.secret_key {
            Some(secret_key) => request.bearer_auth(secret_key),
            None => request,
        }
    }
}

async fn ensure_success(response: Response) -> Result<Response, LiveStoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(LiveStoreError::Status {
        status: status.as_u16(),
        body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    })
}
