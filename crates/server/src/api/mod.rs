pub mod grants;
pub mod rooms;
pub mod webhooks;

use std::sync::Arc;

use axum::{
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use roomsync_common::grant::{compute_grant_scope, GrantScope};
use serde_json::json;
use uuid::Uuid;

use crate::{
    auth::{grant::RoomGrantIssuer, jwt::JwtAccessTokenService, middleware::require_bearer_auth},
    error::{ErrorCode, SyncError},
    live::{LiveStore, LiveStoreError},
    store::{CanonicalStore, StoreError},
    sync::{
        projector::ProjectorError,
        sweeper::SweepError,
        webhook::{WebhookError, WebhookVerifier},
    },
};

/// Everything a handler needs, constructed once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub live: LiveStore,
    pub store: CanonicalStore,
    pub grants: Arc<RoomGrantIssuer>,
    pub webhook: Option<Arc<WebhookVerifier>>,
    pub delete_concurrency: usize,
}

impl AppState {
    /// Grant scope of a principal's current memberships.
    pub(crate) async fn grant_scope_for(&self, user_id: Uuid) -> Result<GrantScope, ApiError> {
        let memberships = self.store.memberships_for_user(user_id).await?;
        Ok(compute_grant_scope(&memberships))
    }
}

pub fn router(state: AppState, jwt_service: Arc<JwtAccessTokenService>) -> Router {
    let authenticated = Router::new()
        .route("/v1/rooms/resync", post(rooms::resync_room))
        .route("/v1/rooms/delete", post(rooms::delete_issue_room))
        .route("/v1/rooms/cleanup/orphans", post(rooms::cleanup_orphans))
        .route("/v1/rooms/cleanup/issues", post(rooms::cleanup_issue_rooms))
        .route("/v1/rooms/{room_id}/metadata", get(rooms::room_metadata))
        .route("/v1/auth/rooms", post(grants::issue_room_grant))
        .route_layer(middleware::from_fn_with_state(jwt_service, require_bearer_auth));

    Router::new()
        .route("/v1/webhooks/storage", post(webhooks::storage_webhook))
        .merge(authenticated)
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest { message: String },
    Unauthorized { message: &'static str },
    Forbidden { message: &'static str },
    NotFound { message: String },
    Verification(WebhookError),
    WebhookNotConfigured,
    Upstream(String),
    Internal(anyhow::Error),
    Sync(SyncError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        Self::Sync(error)
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self::Upstream(error.to_string())
    }
}

impl From<LiveStoreError> for ApiError {
    fn from(error: LiveStoreError) -> Self {
        Self::Upstream(error.to_string())
    }
}

impl From<SweepError> for ApiError {
    fn from(error: SweepError) -> Self {
        Self::Upstream(error.to_string())
    }
}

impl From<ProjectorError> for ApiError {
    fn from(error: ProjectorError) -> Self {
        match error {
            ProjectorError::DocumentNotFound { .. } => Self::not_found(error.to_string()),
            ProjectorError::Live(error) => error.into(),
            ProjectorError::Store(error) => error.into(),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(error: WebhookError) -> Self {
        match error {
            WebhookError::MalformedPayload(message) => Self::bad_request(message),
            other => Self::Verification(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest { message } => {
                SyncError::new(ErrorCode::ValidationFailed, message).into_response()
            }
            Self::Unauthorized { message } => {
                SyncError::new(ErrorCode::AuthInvalidToken, message).into_response()
            }
            Self::Forbidden { message } => {
                SyncError::new(ErrorCode::AuthForbidden, message).into_response()
            }
            Self::NotFound { message } => {
                SyncError::new(ErrorCode::NotFound, message).into_response()
            }
            Self::Verification(error) => {
                tracing::warn!(reason = %error, "rejected unverified webhook delivery");
                SyncError::from_code(ErrorCode::WebhookVerificationFailed)
                    .with_details(json!({ "reason": error.to_string() }))
                    .into_response()
            }
            Self::WebhookNotConfigured => {
                tracing::error!("webhook delivery received but no webhook secret is configured");
                SyncError::new(
                    ErrorCode::WebhookVerificationFailed,
                    "webhook verification is not configured",
                )
                .into_response()
            }
            Self::Upstream(detail) => {
                tracing::error!(error = %detail, "upstream store call failed");
                SyncError::from_code(ErrorCode::UpstreamFailure)
                    .with_details(json!({ "error": detail }))
                    .into_response()
            }
            Self::Internal(error) => {
                tracing::error!(error = ?error, "sync api internal error");
                SyncError::from_code(ErrorCode::InternalError).into_response()
            }
            Self::Sync(error) => error.into_response(),
        }
    }
}
