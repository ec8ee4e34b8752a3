use axum::{
    extract::{Extension, State},
    Json,
};

use super::{ApiError, AppState};
use crate::auth::{
    grant::{GrantSubject, IssuedGrant},
    middleware::AuthenticatedUser,
};

/// Room access grant for the authenticated principal, scoped to the
/// workspaces and spaces they currently belong to.
pub(super) async fn issue_room_grant(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<IssuedGrant>, ApiError> {
    let profile = state.store.principal_profile(user.user_id).await?.ok_or_else(|| {
        tracing::warn!(user_id = %user.user_id, "room grant requested for unknown principal");
        ApiError::Unauthorized { message: "unknown principal" }
    })?;

    let scope = state.grant_scope_for(user.user_id).await?;
    let subject = GrantSubject {
        user_id: profile.user_id,
        name: profile.display_name,
        avatar: profile.avatar_url,
    };

    let grant = state.grants.issue(&subject, scope).map_err(ApiError::Internal)?;
    tracing::info!(
        user_id = %user.user_id,
        patterns = grant.patterns.len(),
        "issued room grant"
    );

    Ok(Json(grant))
}
