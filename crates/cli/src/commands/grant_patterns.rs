// `roomsync grant-patterns`: show the room patterns a principal with the given
// memberships would be granted.

use clap::Args;
use roomsync_common::grant::{
    compute_grant_scope, GrantScope, RoomPermission, WorkspaceMembership,
};
use uuid::Uuid;

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct GrantPatternsArgs {
    /// Memberships as `workspace` or `workspace:space1,space2`.
    memberships: Vec<String>,
}

pub fn run(args: GrantPatternsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let scope = compute_grant_scope(&parse_memberships(&args.memberships));
    output::print_output(format, &scope, format_human)?;
    Ok(())
}

fn parse_memberships(raw: &[String]) -> Vec<WorkspaceMembership> {
    raw.iter()
        .map(|entry| {
            let (workspace, spaces) = entry.split_once(':').unwrap_or((entry.as_str(), ""));
            WorkspaceMembership {
                workspace_id: Uuid::nil(),
                workspace_slug: workspace.trim().to_string(),
                space_slugs: spaces
                    .split(',')
                    .map(str::trim)
                    .filter(|slug| !slug.is_empty())
                    .map(ToOwned::to_owned)
                    .collect(),
            }
        })
        .filter(|membership| !membership.workspace_slug.is_empty())
        .collect()
}

fn format_human(scope: &GrantScope) -> String {
    scope
        .patterns()
        .map(|pattern| {
            let permissions = scope
                .permissions(pattern)
                .unwrap_or_default()
                .iter()
                .map(|permission| match permission {
                    RoomPermission::Read => "room:read",
                    RoomPermission::Write => "room:write",
                })
                .collect::<Vec<_>>()
                .join(",");
            format!("{pattern}  {permissions}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
