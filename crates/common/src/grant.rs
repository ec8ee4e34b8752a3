// Access-grant computation: which room-key patterns a principal may open.
//
// Pure. Signing happens in the server; this module only decides scope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::room::{
    check_space_slug, onboarding_pattern, pattern_matches, pattern_scope, scope_pattern,
    space_pattern, workspace_pattern,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceMembership {
    pub workspace_id: Uuid,
    pub workspace_slug: String,
    /// Slugs of the spaces inside this workspace.
    pub space_slugs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoomPermission {
    #[serde(rename = "room:read")]
    Read,
    #[serde(rename = "room:write")]
    Write,
}

impl RoomPermission {
    pub fn full_access() -> Vec<Self> {
        vec![Self::Read, Self::Write]
    }
}

/// Room-key glob patterns and the permissions granted on each.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantScope(BTreeMap<String, Vec<RoomPermission>>);

impl GrantScope {
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn permissions(&self, pattern: &str) -> Option<&[RoomPermission]> {
        self.0.get(pattern).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when some pattern grants `permission` on `room_key`.
    pub fn allows(&self, room_key: &str, permission: RoomPermission) -> bool {
        self.0.iter().any(|(pattern, permissions)| {
            permissions.contains(&permission) && pattern_matches(pattern, room_key)
        })
    }

    /// True when `permission` is granted on every room of an escaped scope.
    pub fn covers_scope(&self, scope: &str, permission: RoomPermission) -> bool {
        self.permissions(&scope_pattern(scope))
            .is_some_and(|permissions| permissions.contains(&permission))
    }

    /// Escaped scopes wholly granted with `permission`.
    pub fn scopes(&self, permission: RoomPermission) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, permissions)| permissions.contains(&permission))
            .filter_map(|(pattern, _)| pattern_scope(pattern))
            .map(ToOwned::to_owned)
            .collect()
    }

    fn grant_full(&mut self, pattern: String) {
        self.0.insert(pattern, RoomPermission::full_access());
    }
}

/// Compute the grant scope for a principal's current memberships.
///
/// Without memberships the principal only reaches the onboarding namespace.
/// Otherwise every member workspace, and every space inside it, gets full
/// access; duplicate slugs collapse to one pattern. A space slug that could
/// alias a workspace scope (see [`check_space_slug`]) is not granted.
pub fn compute_grant_scope(memberships: &[WorkspaceMembership]) -> GrantScope {
    let mut scope = GrantScope::default();

    if memberships.is_empty() {
        scope.grant_full(onboarding_pattern());
        return scope;
    }

    for membership in memberships {
        scope.grant_full(workspace_pattern(&membership.workspace_slug));
        for space in membership.space_slugs.iter().filter(|slug| check_space_slug(slug).is_ok()) {
            scope.grant_full(space_pattern(space));
        }
    }

    scope
}

const PRESENCE_COLORS: &[&str] = &[
    "#E57373", "#F06292", "#BA68C8", "#9575CD", "#7986CB", "#64B5F6", "#4FC3F7", "#4DD0E1",
    "#4DB6AC", "#81C784", "#AED581", "#FFB74D", "#FF8A65", "#A1887F",
];

/// Presence color for a user, stable across requests and processes (FNV-1a).
pub fn presence_color(user_id: &str) -> &'static str {
    let hash = user_id.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    });
    PRESENCE_COLORS[(hash % PRESENCE_COLORS.len() as u64) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::{room_key, RoomEntity};

    fn membership(slug: &str, spaces: &[&str]) -> WorkspaceMembership {
        WorkspaceMembership {
            workspace_id: Uuid::new_v4(),
            workspace_slug: slug.to_owned(),
            space_slugs: spaces.iter().map(|space| (*space).to_owned()).collect(),
        }
    }

    #[test]
    fn no_memberships_grants_onboarding_only() {
        let scope = compute_grant_scope(&[]);
        assert_eq!(scope.patterns().collect::<Vec<_>>(), vec!["tracker_onboarding-*"]);
        assert!(scope.allows("tracker_onboarding-welcome", RoomPermission::Write));
        assert!(!scope.allows("tracker-acme-wiki", RoomPermission::Read));
    }

    #[test]
    fn one_pattern_per_distinct_workspace() {
        let scope =
            compute_grant_scope(&[membership("acme", &[]), membership("globex", &[]), membership("acme", &[])]);
        assert_eq!(scope.patterns().collect::<Vec<_>>(), vec!["tracker-acme-*", "tracker-globex-*"]);
        assert_eq!(scope.permissions("tracker-acme-*"), Some(&[RoomPermission::Read, RoomPermission::Write][..]));
    }

    #[test]
    fn spaces_of_member_workspaces_are_granted() {
        let scope = compute_grant_scope(&[membership("acme", &["eng", ""])]);
        assert_eq!(scope.len(), 2);
        let space_issue = room_key("acme", RoomEntity::Issue(Uuid::new_v4()), Some("eng"));
        assert!(scope.allows(space_issue.as_str(), RoomPermission::Write));
    }

    #[test]
    fn never_covers_foreign_workspaces() {
        let scope = compute_grant_scope(&[membership("acme", &[])]);
        let foreign = room_key("initech", RoomEntity::Issue(Uuid::new_v4()), None);
        assert!(!scope.allows(foreign.as_str(), RoomPermission::Read));
        assert!(scope.patterns().all(|pattern| pattern.starts_with("tracker-acme-")));
    }

    #[test]
    fn letterless_space_slugs_are_not_granted() {
        // Space "2024" would share the scope of a workspace named "2024".
        let scope = compute_grant_scope(&[membership("acme", &["2024", "eng"])]);
        assert_eq!(scope.patterns().collect::<Vec<_>>(), vec!["tracker-ENG-*", "tracker-acme-*"]);
        let foreign = room_key("2024", RoomEntity::Wiki, None);
        assert!(!scope.allows(foreign.as_str(), RoomPermission::Read));
    }

    #[test]
    fn granted_scopes_exclude_onboarding_and_foreign_scopes() {
        let scope = compute_grant_scope(&[membership("acme", &["eng"])]);
        assert_eq!(scope.scopes(RoomPermission::Write), vec!["ENG", "acme"]);
        assert!(scope.covers_scope("acme", RoomPermission::Write));
        assert!(!scope.covers_scope("globex", RoomPermission::Write));

        let onboarding = compute_grant_scope(&[]);
        assert!(onboarding.scopes(RoomPermission::Write).is_empty());
    }

    #[test]
    fn presence_color_is_deterministic() {
        assert_eq!(presence_color("user-1"), presence_color("user-1"));
        assert!(PRESENCE_COLORS.contains(&presence_color("another-user")));
    }
}
