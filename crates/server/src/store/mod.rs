// Canonical relational store: principals, memberships, issue room references
// and the projected room metadata.
//
// Postgres in production; the in-memory arm backs tests and local runs.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use roomsync_common::{
    grant::WorkspaceMembership,
    projection::MetadataProjection,
    room::{check_space_slug, check_workspace_slug, room_key, RoomEntity, RoomKey, SlugError},
};
use serde::Serialize;
use sqlx::{types::Json, FromRow, PgPool};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("relational store query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("stored metadata for room {room_id} is malformed: {source}")]
    MalformedProjection {
        room_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("relational store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    InvalidSlug(#[from] SlugError),
    #[error("space scope `{scope}` already belongs to another space")]
    SpaceScopeTaken { scope: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalProfile {
    pub user_id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProjection {
    pub room_id: String,
    pub metadata: MetadataProjection,
    pub projected_at: DateTime<Utc>,
}

#[derive(Clone)]
pub enum CanonicalStore {
    Postgres(PgPool),
    Memory(Arc<RwLock<MemoryCanonicalStore>>),
}

impl CanonicalStore {
    pub fn memory() -> (Self, Arc<RwLock<MemoryCanonicalStore>>) {
        let state = Arc::new(RwLock::new(MemoryCanonicalStore::default()));
        (Self::Memory(Arc::clone(&state)), state)
    }

    pub async fn principal_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<PrincipalProfile>, StoreError> {
        match self {
            Self::Postgres(pool) => principal_profile_pg(pool, user_id).await,
            Self::Memory(store) => principal_profile_memory(store, user_id).await,
        }
    }

    /// Active memberships of `user_id`, each with the slugs of the
    /// workspace's spaces. Ordered by workspace slug.
    pub async fn memberships_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WorkspaceMembership>, StoreError> {
        match self {
            Self::Postgres(pool) => memberships_for_user_pg(pool, user_id).await,
            Self::Memory(store) => memberships_for_user_memory(store, user_id).await,
        }
    }

    /// Every room reference held by an issue record.
    pub async fn room_references(&self) -> Result<HashSet<String>, StoreError> {
        match self {
            Self::Postgres(pool) => room_references_pg(pool).await,
            Self::Memory(store) => room_references_memory(store).await,
        }
    }

    pub async fn issue_room_reference(&self, issue_id: Uuid) -> Result<Option<RoomKey>, StoreError> {
        match self {
            Self::Postgres(pool) => issue_room_reference_pg(pool, issue_id).await,
            Self::Memory(store) => issue_room_reference_memory(store, issue_id).await,
        }
    }

    /// Insert or replace the projection for `room_id`. Writing the same
    /// projection twice leaves the same metadata behind.
    pub async fn upsert_projection(
        &self,
        room_id: &str,
        metadata: &MetadataProjection,
    ) -> Result<StoredProjection, StoreError> {
        match self {
            Self::Postgres(pool) => upsert_projection_pg(pool, room_id, metadata).await,
            Self::Memory(store) => upsert_projection_memory(store, room_id, metadata).await,
        }
    }

    pub async fn projection(&self, room_id: &str) -> Result<Option<StoredProjection>, StoreError> {
        match self {
            Self::Postgres(pool) => projection_pg(pool, room_id).await,
            Self::Memory(store) => projection_memory(store, room_id).await,
        }
    }

    pub async fn check_health(&self) -> Result<(), StoreError> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await?;
                Ok(())
            }
            Self::Memory(store) => store.read().await.ensure_available(),
        }
    }
}

// ── Postgres ───────────────────────────────────────────────────────

#[derive(FromRow)]
struct ProfileRow {
    id: Uuid,
    display_name: String,
    avatar_url: Option<String>,
}

#[derive(FromRow)]
struct MembershipRow {
    workspace_id: Uuid,
    workspace_slug: String,
    space_slugs: Vec<String>,
}

#[derive(FromRow)]
struct ProjectionRow {
    room_id: String,
    metadata: Json<serde_json::Value>,
    projected_at: DateTime<Utc>,
}

impl TryFrom<ProjectionRow> for StoredProjection {
    type Error = StoreError;

    fn try_from(row: ProjectionRow) -> Result<Self, Self::Error> {
        let metadata = serde_json::from_value(row.metadata.0).map_err(|source| {
            StoreError::MalformedProjection { room_id: row.room_id.clone(), source }
        })?;
        Ok(Self { room_id: row.room_id, metadata, projected_at: row.projected_at })
    }
}

async fn principal_profile_pg(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<PrincipalProfile>, StoreError> {
    let row = sqlx::query_as::<_, ProfileRow>(
        "SELECT id, display_name, avatar_url FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| PrincipalProfile {
        user_id: row.id,
        display_name: row.display_name,
        avatar_url: row.avatar_url,
    }))
}

async fn memberships_for_user_pg(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<WorkspaceMembership>, StoreError> {
    let rows = sqlx::query_as::<_, MembershipRow>(
        r#"
        SELECT
            w.id AS workspace_id,
            w.slug AS workspace_slug,
            COALESCE(
                array_agg(s.slug ORDER BY s.slug) FILTER (WHERE s.slug IS NOT NULL),
                '{}'
            ) AS space_slugs
        FROM workspace_members AS wm
        INNER JOIN workspaces AS w
            ON w.id = wm.workspace_id
        LEFT JOIN spaces AS s
            ON s.workspace_id = w.id
        WHERE wm.user_id = $1
          AND wm.status = 'active'
          AND w.deleted_at IS NULL
        GROUP BY w.id, w.slug
        ORDER BY w.slug
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| WorkspaceMembership {
            workspace_id: row.workspace_id,
            workspace_slug: row.workspace_slug,
            space_slugs: row.space_slugs,
        })
        .collect())
}

async fn room_references_pg(pool: &PgPool) -> Result<HashSet<String>, StoreError> {
    let references = sqlx::query_scalar::<_, String>(
        "SELECT room_reference FROM issues WHERE room_reference IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;

    Ok(references.into_iter().collect())
}

async fn issue_room_reference_pg(
    pool: &PgPool,
    issue_id: Uuid,
) -> Result<Option<RoomKey>, StoreError> {
    let reference = sqlx::query_scalar::<_, Option<String>>(
        "SELECT room_reference FROM issues WHERE id = $1",
    )
    .bind(issue_id)
    .fetch_optional(pool)
    .await?;

    Ok(reference.flatten().map(RoomKey::new))
}

async fn upsert_projection_pg(
    pool: &PgPool,
    room_id: &str,
    metadata: &MetadataProjection,
) -> Result<StoredProjection, StoreError> {
    let row = sqlx::query_as::<_, ProjectionRow>(
        r#"
        INSERT INTO room_metadata (room_id, metadata, projected_at)
        VALUES ($1, $2, now())
        ON CONFLICT (room_id) DO UPDATE
        SET metadata = EXCLUDED.metadata,
            projected_at = EXCLUDED.projected_at
        RETURNING room_id, metadata, projected_at
        "#,
    )
    .bind(room_id)
    .bind(Json(metadata))
    .fetch_one(pool)
    .await?;

    row.try_into()
}

async fn projection_pg(pool: &PgPool, room_id: &str) -> Result<Option<StoredProjection>, StoreError> {
    sqlx::query_as::<_, ProjectionRow>(
        "SELECT room_id, metadata, projected_at FROM room_metadata WHERE room_id = $1",
    )
    .bind(room_id)
    .fetch_optional(pool)
    .await?
    .map(StoredProjection::try_from)
    .transpose()
}

// ── In-memory ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryCanonicalStore {
    users: HashMap<Uuid, MemoryUser>,
    workspaces: HashMap<Uuid, MemoryWorkspace>,
    spaces: HashMap<Uuid, MemorySpace>,
    /// (workspace_id, user_id) -> active
    memberships: HashMap<(Uuid, Uuid), bool>,
    issues: HashMap<Uuid, MemoryIssue>,
    projections: HashMap<String, StoredProjection>,
    unavailable: bool,
}

struct MemoryUser {
    display_name: String,
    avatar_url: Option<String>,
}

struct MemoryWorkspace {
    slug: String,
    deleted: bool,
}

struct MemorySpace {
    workspace_id: Uuid,
    slug: String,
}

struct MemoryIssue {
    room_reference: Option<String>,
}

impl MemoryCanonicalStore {
    pub fn add_user(&mut self, display_name: &str, avatar_url: Option<&str>) -> Uuid {
        let user_id = Uuid::new_v4();
        self.users.insert(
            user_id,
            MemoryUser {
                display_name: display_name.to_owned(),
                avatar_url: avatar_url.map(ToOwned::to_owned),
            },
        );
        user_id
    }

    pub fn add_workspace(&mut self, slug: &str) -> Result<Uuid, StoreError> {
        check_workspace_slug(slug)?;
        let workspace_id = Uuid::new_v4();
        self.workspaces.insert(workspace_id, MemoryWorkspace { slug: slug.to_owned(), deleted: false });
        Ok(workspace_id)
    }

    pub fn delete_workspace(&mut self, workspace_id: Uuid) {
        if let Some(workspace) = self.workspaces.get_mut(&workspace_id) {
            workspace.deleted = true;
        }
    }

    /// Same rules as the `spaces` constraints: the upper-cased slug is
    /// unique across all workspaces.
    pub fn add_space(&mut self, workspace_id: Uuid, slug: &str) -> Result<Uuid, StoreError> {
        check_space_slug(slug)?;
        let scope = slug.to_uppercase();
        if self.spaces.values().any(|space| space.slug.to_uppercase() == scope) {
            return Err(StoreError::SpaceScopeTaken { scope });
        }
        let space_id = Uuid::new_v4();
        self.spaces.insert(space_id, MemorySpace { workspace_id, slug: slug.to_owned() });
        Ok(space_id)
    }

    pub fn add_member(&mut self, workspace_id: Uuid, user_id: Uuid) {
        self.memberships.insert((workspace_id, user_id), true);
    }

    pub fn suspend_member(&mut self, workspace_id: Uuid, user_id: Uuid) {
        self.memberships.insert((workspace_id, user_id), false);
    }

    /// Create an issue whose room reference is derived the same way clients
    /// derive it.
    pub fn add_issue(&mut self, workspace_id: Uuid, space_id: Option<Uuid>) -> (Uuid, RoomKey) {
        let issue_id = Uuid::new_v4();
        let workspace_slug =
            self.workspaces.get(&workspace_id).map(|w| w.slug.clone()).unwrap_or_default();
        let space_slug = space_id.and_then(|id| self.spaces.get(&id)).map(|s| s.slug.clone());
        let key = room_key(&workspace_slug, RoomEntity::Issue(issue_id), space_slug.as_deref());
        self.issues
            .insert(issue_id, MemoryIssue { room_reference: Some(key.as_str().to_owned()) });
        (issue_id, key)
    }

    /// Issue record that never had a room attached.
    pub fn add_issue_without_room(&mut self) -> Uuid {
        let issue_id = Uuid::new_v4();
        self.issues.insert(issue_id, MemoryIssue { room_reference: None });
        issue_id
    }

    pub fn remove_issue(&mut self, issue_id: Uuid) {
        self.issues.remove(&issue_id);
    }

    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_owned()));
        }
        Ok(())
    }
}

async fn principal_profile_memory(
    store: &Arc<RwLock<MemoryCanonicalStore>>,
    user_id: Uuid,
) -> Result<Option<PrincipalProfile>, StoreError> {
    let state = store.read().await;
    state.ensure_available()?;

    Ok(state.users.get(&user_id).map(|user| PrincipalProfile {
        user_id,
        display_name: user.display_name.clone(),
        avatar_url: user.avatar_url.clone(),
    }))
}

async fn memberships_for_user_memory(
    store: &Arc<RwLock<MemoryCanonicalStore>>,
    user_id: Uuid,
) -> Result<Vec<WorkspaceMembership>, StoreError> {
    let state = store.read().await;
    state.ensure_available()?;

    let mut memberships: Vec<WorkspaceMembership> = state
        .memberships
        .iter()
        .filter(|((_, member), active)| *member == user_id && **active)
        .filter_map(|((workspace_id, _), _)| {
            let workspace = state.workspaces.get(workspace_id).filter(|w| !w.deleted)?;
            let mut space_slugs: Vec<String> = state
                .spaces
                .values()
                .filter(|space| space.workspace_id == *workspace_id)
                .map(|space| space.slug.clone())
                .collect();
            space_slugs.sort();
            Some(WorkspaceMembership {
                workspace_id: *workspace_id,
                workspace_slug: workspace.slug.clone(),
                space_slugs,
            })
        })
        .collect();
    memberships.sort_by(|left, right| left.workspace_slug.cmp(&right.workspace_slug));

    Ok(memberships)
}

async fn room_references_memory(
    store: &Arc<RwLock<MemoryCanonicalStore>>,
) -> Result<HashSet<String>, StoreError> {
    let state = store.read().await;
    state.ensure_available()?;

    Ok(state.issues.values().filter_map(|issue| issue.room_reference.clone()).collect())
}

async fn issue_room_reference_memory(
    store: &Arc<RwLock<MemoryCanonicalStore>>,
    issue_id: Uuid,
) -> Result<Option<RoomKey>, StoreError> {
    let state = store.read().await;
    state.ensure_available()?;

    Ok(state
        .issues
        .get(&issue_id)
        .and_then(|issue| issue.room_reference.clone())
        .map(RoomKey::new))
}

async fn upsert_projection_memory(
    store: &Arc<RwLock<MemoryCanonicalStore>>,
    room_id: &str,
    metadata: &MetadataProjection,
) -> Result<StoredProjection, StoreError> {
    let mut state = store.write().await;
    state.ensure_available()?;

    let stored = StoredProjection {
        room_id: room_id.to_owned(),
        metadata: metadata.clone(),
        projected_at: Utc::now(),
    };
    state.projections.insert(room_id.to_owned(), stored.clone());

    Ok(stored)
}

async fn projection_memory(
    store: &Arc<RwLock<MemoryCanonicalStore>>,
    room_id: &str,
) -> Result<Option<StoredProjection>, StoreError> {
    let state = store.read().await;
    state.ensure_available()?;

    Ok(state.projections.get(room_id).cloned())
}
