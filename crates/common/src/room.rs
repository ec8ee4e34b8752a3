// Room key derivation and classification.
//
// Keys: `<namespace>-<scope>-<tail>`. The scope is the workspace slug, or the
// upper-cased space slug when the entity lives in a space. Any scope character
// outside `[A-Za-z0-9_]` is percent-escaped: the first `-` after the namespace
// always ends the scope.
// Classification is prefix matching on the segment after the scope.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Namespace shared by every workspace-scoped room.
pub const ROOM_NAMESPACE: &str = "tracker";
/// Namespace for rooms opened by principals that have not joined a workspace.
pub const ONBOARDING_NAMESPACE: &str = "tracker_onboarding";

const ROOM_PREFIX: &str = "tracker-";
const PROJECT_MARKER: &str = "project-";
const WIKI_MARKER: &str = "wiki";

/// The entity a room belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomEntity {
    Issue(Uuid),
    Project(Uuid),
    /// The single wiki document of a workspace or space.
    Wiki,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Issue,
    Project,
    Wiki,
    /// Outside the `tracker` namespace (onboarding rooms, foreign tenants).
    Foreign,
}

/// A collaborative session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    /// Wrap a key read back from a store. No validation is performed; use
    /// [`room_key`] to derive keys for known entities.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn kind(&self) -> RoomKind {
        classify(&self.0)
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<RoomKey> for String {
    fn from(value: RoomKey) -> Self {
        value.0
    }
}

/// Derive the room key for an entity.
///
/// A present, non-empty `space_slug` takes precedence over the workspace slug
/// and is upper-cased. The result only depends on the arguments.
pub fn room_key(workspace_slug: &str, entity: RoomEntity, space_slug: Option<&str>) -> RoomKey {
    let scope = room_scope(workspace_slug, space_slug);
    let key = match entity {
        RoomEntity::Issue(id) => format!("{ROOM_NAMESPACE}-{scope}-{}", id.hyphenated()),
        RoomEntity::Project(id) => {
            format!("{ROOM_NAMESPACE}-{scope}-{PROJECT_MARKER}{}", id.hyphenated())
        }
        RoomEntity::Wiki => format!("{ROOM_NAMESPACE}-{scope}-{WIKI_MARKER}"),
    };
    RoomKey(key)
}

/// The escaped scope segment used in keys and grant patterns.
pub fn room_scope(workspace_slug: &str, space_slug: Option<&str>) -> String {
    match space_slug.filter(|slug| !slug.is_empty()) {
        Some(space) => escape_scope(&space.to_uppercase()),
        None => escape_scope(workspace_slug),
    }
}

fn escape_scope(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            escaped.push(ch);
            continue;
        }
        let mut buf = [0u8; 4];
        for byte in ch.encode_utf8(&mut buf).bytes() {
            escaped.push_str(&format!("%{byte:02X}"));
        }
    }
    escaped
}

/// Slug shapes that keep every scope owned by a single workspace.
///
/// Space scopes carry no workspace, so the store keeps upper-cased space slugs
/// unique across workspaces. A workspace scope never equals a space scope:
/// workspace slugs are lower-case and space slugs contain an ASCII letter,
/// which survives upper-casing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlugError {
    #[error("slug must not be empty")]
    Empty,
    #[error("workspace slug `{0}` must be lower-case")]
    UppercaseWorkspace(String),
    #[error("space slug `{0}` must contain an ASCII letter")]
    SpaceWithoutLetter(String),
}

pub fn check_workspace_slug(slug: &str) -> Result<(), SlugError> {
    if slug.is_empty() {
        return Err(SlugError::Empty);
    }
    if slug != slug.to_lowercase() {
        return Err(SlugError::UppercaseWorkspace(slug.to_owned()));
    }
    Ok(())
}

pub fn check_space_slug(slug: &str) -> Result<(), SlugError> {
    if slug.is_empty() {
        return Err(SlugError::Empty);
    }
    if !slug.chars().any(|ch| ch.is_ascii_alphabetic()) {
        return Err(SlugError::SpaceWithoutLetter(slug.to_owned()));
    }
    Ok(())
}

pub fn classify(key: &str) -> RoomKind {
    let Some((_scope, tail)) = key.strip_prefix(ROOM_PREFIX).and_then(|rest| rest.split_once('-'))
    else {
        return RoomKind::Foreign;
    };

    if tail.starts_with(PROJECT_MARKER) {
        RoomKind::Project
    } else if tail == WIKI_MARKER {
        RoomKind::Wiki
    } else {
        RoomKind::Issue
    }
}

pub fn is_issue_room(key: &str) -> bool {
    classify(key) == RoomKind::Issue
}

pub fn is_project_room(key: &str) -> bool {
    classify(key) == RoomKind::Project
}

pub fn is_wiki_room(key: &str) -> bool {
    classify(key) == RoomKind::Wiki
}

/// True when `key` belongs to the given escaped scope (see [`room_scope`]).
pub fn in_scope(key: &str, scope: &str) -> bool {
    key.strip_prefix(ROOM_PREFIX)
        .and_then(|rest| rest.strip_prefix(scope))
        .is_some_and(|rest| rest.starts_with('-'))
}

/// Glob pattern covering every room of a workspace.
pub fn workspace_pattern(workspace_slug: &str) -> String {
    scope_pattern(&room_scope(workspace_slug, None))
}

/// Glob pattern covering every room of a space.
pub fn space_pattern(space_slug: &str) -> String {
    scope_pattern(&escape_scope(&space_slug.to_uppercase()))
}

pub fn onboarding_pattern() -> String {
    format!("{ONBOARDING_NAMESPACE}-*")
}

/// Glob pattern for an already escaped scope.
pub fn scope_pattern(scope: &str) -> String {
    format!("{ROOM_NAMESPACE}-{scope}-*")
}

/// The escaped scope a `tracker-<scope>-*` pattern covers. Onboarding and
/// exact-key patterns have none.
pub fn pattern_scope(pattern: &str) -> Option<&str> {
    pattern
        .strip_prefix(ROOM_PREFIX)
        .and_then(|rest| rest.strip_suffix("-*"))
        .filter(|scope| !scope.is_empty() && !scope.contains('-'))
}

/// Match a room key against a grant pattern. Only a trailing `*` is special.
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    }
}
