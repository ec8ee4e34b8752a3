use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use super::{ApiError, AppState};
use crate::sync::{
    projector::project_room,
    webhook::{parse_notification, Notification},
};

/// Storage-change notifications from the live store. The signature is
/// checked before the payload is even parsed.
pub(super) async fn storage_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let verifier = state.webhook.as_ref().ok_or(ApiError::WebhookNotConfigured)?;
    verifier.verify(&headers, &body)?;

    match parse_notification(&body)? {
        Notification::StorageUpdated { room_id } => {
            project_room(&state.live, &state.store, &room_id).await?;
        }
        Notification::Other { event_type } => {
            tracing::debug!(event_type = %event_type, "ignoring webhook event");
        }
    }

    Ok(StatusCode::OK)
}
