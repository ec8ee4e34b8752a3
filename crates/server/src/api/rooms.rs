use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    Json,
};
use roomsync_common::{
    grant::RoomPermission,
    types::{
        CleanupReport, CleanupScopeRequest, DeleteRoomRequest, DeleteRoomResponse, ResyncRequest,
        ResyncResponse,
    },
};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::{
    auth::middleware::AuthenticatedUser,
    store::StoredProjection,
    sync::{
        lifecycle::{self, cleanup_scope, purge_issue_rooms, resolve_issue_room},
        projector::project_room,
        sweeper::sweep_orphans,
    },
    validation::{optional_field, required_field, ValidatedJson},
};

async fn authorize_room(
    state: &AppState,
    user: AuthenticatedUser,
    room_id: &str,
    permission: RoomPermission,
) -> Result<(), ApiError> {
    let scope = state.grant_scope_for(user.user_id).await?;
    if scope.allows(room_id, permission) {
        return Ok(());
    }

    tracing::warn!(user_id = %user.user_id, room_id, "room outside caller grant scope");
    Err(ApiError::Forbidden { message: "room is outside the caller's grant scope" })
}

/// Re-project one room on demand, for recovery or after a missed webhook.
pub(super) async fn resync_room(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ValidatedJson(payload): ValidatedJson<ResyncRequest>,
) -> Result<Json<ResyncResponse>, ApiError> {
    let room_id = required_field(payload.room_id.as_deref(), "roomId")?;
    authorize_room(&state, user, room_id, RoomPermission::Write).await?;

    let metadata = project_room(&state.live, &state.store, room_id).await?;

    Ok(Json(ResyncResponse { room_id: room_id.to_owned(), metadata }))
}

/// Delete the live room of an issue. Deleting a room that is already gone
/// still succeeds.
pub(super) async fn delete_issue_room(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ValidatedJson(payload): ValidatedJson<DeleteRoomRequest>,
) -> Result<Json<DeleteRoomResponse>, ApiError> {
    let issue_id = required_field(payload.issue_id.as_deref(), "issueId")?;
    let issue_id = Uuid::parse_str(issue_id)
        .map_err(|_| ApiError::bad_request(format!("issueId `{issue_id}` is not a UUID")))?;

    let room = resolve_issue_room(
        &state.store,
        issue_id,
        optional_field(payload.workspace_slug.as_deref()),
        optional_field(payload.space_slug.as_deref()),
    )
    .await?
    .ok_or_else(|| {
        ApiError::bad_request("workspaceSlug is required for issues without a stored room")
    })?;

    authorize_room(&state, user, room.as_str(), RoomPermission::Write).await?;
    lifecycle::delete_room(&state.live, room.as_str()).await?;

    Ok(Json(DeleteRoomResponse { success: true, room_id: room.into_string() }))
}

/// Delete live rooms that no issue references any more.
pub(super) async fn cleanup_orphans(
    State(state): State<AppState>,
) -> Result<Json<CleanupReport>, ApiError> {
    let report = sweep_orphans(&state.live, &state.store, state.delete_concurrency).await?;
    Ok(Json(report))
}

/// Bulk-delete issue rooms within the caller's grant. A requested scope must
/// be one the caller holds write access to; an empty body purges every such
/// scope.
pub(super) async fn cleanup_issue_rooms(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Bytes,
) -> Result<Json<CleanupReport>, ApiError> {
    let request: CleanupScopeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CleanupScopeRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|error| ApiError::bad_request(format!("invalid cleanup scope: {error}")))?
    };

    let grant = state.grant_scope_for(user.user_id).await?;
    let requested = cleanup_scope(
        optional_field(request.workspace_slug.as_deref()),
        optional_field(request.space_slug.as_deref()),
    );
    let scopes = match requested {
        Some(scope) if grant.covers_scope(&scope, RoomPermission::Write) => vec![scope],
        Some(scope) => {
            tracing::warn!(user_id = %user.user_id, scope = %scope, "cleanup scope outside caller grant");
            return Err(ApiError::Forbidden {
                message: "cleanup scope is outside the caller's grant scope",
            });
        }
        None => grant.scopes(RoomPermission::Write),
    };

    let report =
        purge_issue_rooms(&state.live, Some(scopes.as_slice()), state.delete_concurrency).await?;

    Ok(Json(report))
}

pub(super) async fn room_metadata(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(room_id): Path<String>,
) -> Result<Json<StoredProjection>, ApiError> {
    authorize_room(&state, user, &room_id, RoomPermission::Read).await?;

    let projection = state
        .store
        .projection(&room_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no metadata projected for room {room_id}")))?;

    Ok(Json(projection))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, Request, StatusCode},
    };
    use roomsync_common::room::{room_key, RoomEntity};
    use serde_json::json;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::api::test_support::{read_json, TestApp};

    struct Seeded {
        user: Uuid,
        workspace: Uuid,
    }

    async fn member_of_acme(app: &TestApp) -> Seeded {
        let mut records = app.records.write().await;
        let user = records.add_user("Ada", None);
        let workspace = records.add_workspace("acme").unwrap();
        records.add_member(workspace, user);
        Seeded { user, workspace }
    }

    #[tokio::test]
    async fn room_endpoints_require_bearer_token() {
        let app = TestApp::new();
        for uri in [
            "/v1/rooms/resync",
            "/v1/rooms/delete",
            "/v1/rooms/cleanup/orphans",
            "/v1/rooms/cleanup/issues",
        ] {
            let response = app.post_json(uri, None, json!({})).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
        let response = app.get("/v1/rooms/tracker-acme-wiki/metadata", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn resync_projects_room_and_returns_metadata() {
        let app = TestApp::new();
        let seeded = member_of_acme(&app).await;
        let room = room_key("acme", RoomEntity::Issue(Uuid::new_v4()), None);
        app.rooms.open(room.as_str()).await;
        app.rooms
            .edit(room.as_str(), |doc| {
                doc.set_title("Flaky deploy");
                doc.set_progress("in_progress");
                doc.assign("user-7");
            })
            .await;

        let response = app
            .post_json("/v1/rooms/resync", Some(seeded.user), json!({ "roomId": room.as_str() }))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["roomId"], room.as_str());
        assert_eq!(body["metadata"]["title"], "Flaky deploy");
        assert_eq!(body["metadata"]["progress"], "in_progress");
        assert_eq!(body["metadata"]["assignedTo"], "user-7");

        let stored = app.store.projection(room.as_str()).await.unwrap().expect("stored");
        assert_eq!(stored.metadata.title, "Flaky deploy");
    }

    #[tokio::test]
    async fn resync_requires_room_id() {
        let app = TestApp::new();
        let seeded = member_of_acme(&app).await;

        let response =
            app.post_json("/v1/rooms/resync", Some(seeded.user), json!({ "roomId": "  " })).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
        assert_eq!(body["error"]["details"]["field"], "roomId");
    }

    #[tokio::test]
    async fn resync_outside_grant_scope_is_forbidden() {
        let app = TestApp::new();
        let seeded = member_of_acme(&app).await;
        app.rooms.open("tracker-globex-wiki").await;

        let response = app
            .post_json(
                "/v1/rooms/resync",
                Some(seeded.user),
                json!({ "roomId": "tracker-globex-wiki" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(app.store.projection("tracker-globex-wiki").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resync_of_unknown_room_is_not_found() {
        let app = TestApp::new();
        let seeded = member_of_acme(&app).await;

        let response = app
            .post_json("/v1/rooms/resync", Some(seeded.user), json!({ "roomId": "tracker-acme-wiki" }))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_uses_stored_reference_and_is_idempotent() {
        let app = TestApp::new();
        let seeded = member_of_acme(&app).await;
        let (issue_id, room) = app.records.write().await.add_issue(seeded.workspace, None);
        app.rooms.open(room.as_str()).await;

        for _ in 0..2 {
            let response = app
                .post_json(
                    "/v1/rooms/delete",
                    Some(seeded.user),
                    json!({ "issueId": issue_id.to_string() }),
                )
                .await;
            assert_eq!(response.status(), StatusCode::OK);
            let body = read_json(response).await;
            assert_eq!(body, json!({ "success": true, "roomId": room.as_str() }));
        }
        assert!(!app.rooms.contains(room.as_str()).await);
    }

    #[tokio::test]
    async fn delete_derives_room_from_slugs_when_issue_is_unknown() {
        let app = TestApp::new();
        let seeded = {
            let seeded = member_of_acme(&app).await;
            app.records.write().await.add_space(seeded.workspace, "eng").unwrap();
            seeded
        };
        let issue_id = Uuid::new_v4();
        let room = room_key("acme", RoomEntity::Issue(issue_id), Some("eng"));
        app.rooms.open(room.as_str()).await;

        let response = app
            .post_json(
                "/v1/rooms/delete",
                Some(seeded.user),
                json!({ "issueId": issue_id, "workspaceSlug": "acme", "spaceSlug": "eng" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["roomId"], room.as_str());
        assert!(!app.rooms.contains(room.as_str()).await);
    }

    #[tokio::test]
    async fn delete_rejects_unresolvable_and_malformed_issues() {
        let app = TestApp::new();
        let seeded = member_of_acme(&app).await;

        let response =
            app.post_json("/v1/rooms/delete", Some(seeded.user), json!({ "issueId": "nope" })).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .post_json("/v1/rooms/delete", Some(seeded.user), json!({ "issueId": Uuid::new_v4() }))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.post_json("/v1/rooms/delete", Some(seeded.user), json!({})).await;
        assert_eq!(read_json(response).await["error"]["details"]["field"], "issueId");
    }

    #[tokio::test]
    async fn delete_failure_is_retryable_upstream_error() {
        let app = TestApp::new();
        let seeded = member_of_acme(&app).await;
        let (issue_id, room) = app.records.write().await.add_issue(seeded.workspace, None);
        app.rooms.open(room.as_str()).await;
        app.rooms.fail_deletes_for(room.as_str()).await;

        let response = app
            .post_json("/v1/rooms/delete", Some(seeded.user), json!({ "issueId": issue_id }))
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert_eq!(body["error"]["code"], "UPSTREAM_FAILURE");
        assert_eq!(body["error"]["retryable"], true);
        assert!(app.rooms.contains(room.as_str()).await);
    }

    #[tokio::test]
    async fn orphan_cleanup_deletes_only_unreferenced_rooms() {
        let app = TestApp::new();
        let seeded = member_of_acme(&app).await;
        let (_, referenced) = app.records.write().await.add_issue(seeded.workspace, None);
        let orphan_a = room_key("acme", RoomEntity::Issue(Uuid::new_v4()), None);
        let orphan_c = room_key("acme", RoomEntity::Issue(Uuid::new_v4()), None);
        for room in [&referenced, &orphan_a, &orphan_c] {
            app.rooms.open(room.as_str()).await;
        }

        let response = app.post_json("/v1/rooms/cleanup/orphans", Some(seeded.user), json!({})).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["total"], 2);
        assert_eq!(body["deleted"], 2);

        assert_eq!(app.rooms.room_ids().await, vec![referenced.as_str().to_owned()]);
    }

    #[tokio::test]
    async fn orphan_cleanup_reports_each_failure() {
        let app = TestApp::new();
        let seeded = member_of_acme(&app).await;
        let healthy = room_key("acme", RoomEntity::Issue(Uuid::from_u128(1)), None);
        let stuck = room_key("acme", RoomEntity::Issue(Uuid::from_u128(2)), None);
        app.rooms.open(healthy.as_str()).await;
        app.rooms.open(stuck.as_str()).await;
        app.rooms.open("tracker-acme-wiki").await;
        app.rooms.fail_deletes_for(stuck.as_str()).await;

        let body = read_json(
            app.post_json("/v1/rooms/cleanup/orphans", Some(seeded.user), json!({})).await,
        )
        .await;
        assert_eq!(body["success"], false);
        assert_eq!((body["deleted"].as_u64(), body["failed"].as_u64()), (Some(1), Some(1)));
        assert_eq!(body["results"][1]["roomId"], stuck.as_str());
        assert_eq!(body["results"][1]["status"], "error");
        assert_eq!(
            app.rooms.room_ids().await,
            vec![stuck.as_str().to_owned(), "tracker-acme-wiki".to_owned()]
        );
    }

    #[tokio::test]
    async fn orphan_cleanup_aborts_when_listing_fails() {
        let app = TestApp::new();
        let seeded = member_of_acme(&app).await;
        app.rooms.open("tracker-acme-wiki").await;
        app.rooms.set_listing_unavailable(true).await;

        let response = app.post_json("/v1/rooms/cleanup/orphans", Some(seeded.user), json!({})).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(app.rooms.contains("tracker-acme-wiki").await);
    }

    #[tokio::test]
    async fn issue_cleanup_honours_scope_and_spares_other_rooms() {
        let app = TestApp::new();
        let seeded = member_of_acme(&app).await;
        let acme_issue = room_key("acme", RoomEntity::Issue(Uuid::new_v4()), None);
        let globex_issue = room_key("globex", RoomEntity::Issue(Uuid::new_v4()), None);
        for room in [acme_issue.as_str(), globex_issue.as_str(), "tracker-acme-wiki"] {
            app.rooms.open(room).await;
        }

        let body = read_json(
            app.post_json(
                "/v1/rooms/cleanup/issues",
                Some(seeded.user),
                json!({ "workspaceSlug": "acme" }),
            )
            .await,
        )
        .await;
        assert_eq!(body["deleted"], 1);
        assert!(!app.rooms.contains(acme_issue.as_str()).await);
        assert!(app.rooms.contains(globex_issue.as_str()).await);
        assert!(app.rooms.contains("tracker-acme-wiki").await);
    }

    #[tokio::test]
    async fn issue_cleanup_with_empty_body_purges_granted_scopes_only() {
        let app = TestApp::new();
        let seeded = member_of_acme(&app).await;
        let acme_issue = room_key("acme", RoomEntity::Issue(Uuid::new_v4()), None);
        let globex_issue = room_key("globex", RoomEntity::Issue(Uuid::new_v4()), None);
        app.rooms.open(acme_issue.as_str()).await;
        app.rooms.open(globex_issue.as_str()).await;

        let request = Request::post("/v1/rooms/cleanup/issues")
            .header(AUTHORIZATION, app.bearer(seeded.user))
            .body(Body::empty())
            .expect("request");
        let response = app.app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["deleted"], 1);
        assert_eq!(app.rooms.room_ids().await, vec![globex_issue.as_str().to_owned()]);
    }

    #[tokio::test]
    async fn issue_cleanup_of_foreign_scope_is_forbidden() {
        let app = TestApp::new();
        let seeded = member_of_acme(&app).await;
        let globex_issue = room_key("globex", RoomEntity::Issue(Uuid::new_v4()), None);
        let globex_space_issue = room_key("globex", RoomEntity::Issue(Uuid::new_v4()), Some("ops"));
        app.rooms.open(globex_issue.as_str()).await;
        app.rooms.open(globex_space_issue.as_str()).await;

        for scope in [json!({ "workspaceSlug": "globex" }), json!({ "spaceSlug": "ops" })] {
            let response =
                app.post_json("/v1/rooms/cleanup/issues", Some(seeded.user), scope.clone()).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{scope}");
            assert_eq!(read_json(response).await["error"]["code"], "AUTH_FORBIDDEN");
        }
        assert_eq!(app.rooms.room_ids().await.len(), 2);
    }

    #[tokio::test]
    async fn issue_cleanup_without_memberships_deletes_nothing() {
        let app = TestApp::new();
        let newcomer = app.records.write().await.add_user("Newcomer", None);
        let acme_issue = room_key("acme", RoomEntity::Issue(Uuid::new_v4()), None);
        app.rooms.open(acme_issue.as_str()).await;

        let response = app.post_json("/v1/rooms/cleanup/issues", Some(newcomer), json!({})).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["total"], 0);
        assert_eq!(body["success"], true);

        let response = app
            .post_json("/v1/rooms/cleanup/issues", Some(newcomer), json!({ "workspaceSlug": "acme" }))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(app.rooms.contains(acme_issue.as_str()).await);
    }

    #[tokio::test]
    async fn metadata_is_served_within_scope_only() {
        let app = TestApp::new();
        let seeded = member_of_acme(&app).await;
        app.rooms.open("tracker-acme-wiki").await;
        app.rooms.open("tracker-globex-wiki").await;
        crate::sync::projector::project_room(
            &crate::live::LiveStore::Memory(app.rooms.clone()),
            &app.store,
            "tracker-globex-wiki",
        )
        .await
        .unwrap();

        let response = app.get("/v1/rooms/tracker-acme-wiki/metadata", Some(seeded.user)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.get("/v1/rooms/tracker-globex-wiki/metadata", Some(seeded.user)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        app.post_json("/v1/rooms/resync", Some(seeded.user), json!({ "roomId": "tracker-acme-wiki" }))
            .await;
        let response = app.get("/v1/rooms/tracker-acme-wiki/metadata", Some(seeded.user)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["roomId"], "tracker-acme-wiki");
        assert_eq!(body["metadata"]["title"], "Untitled");
    }
}
