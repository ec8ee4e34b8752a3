// `roomsync purge-issues`: bulk-delete issue rooms.

use anyhow::Context;
use clap::Args;
use roomsync_common::types::{CleanupReport, CleanupScopeRequest};

use super::{block_on, ServerArgs};
use crate::exit_code::UsageError;
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct PurgeIssuesArgs {
    /// Only purge issue rooms of this workspace.
    #[arg(long)]
    workspace: Option<String>,
    /// Only purge issue rooms of this space.
    #[arg(long)]
    space: Option<String>,
    /// Purge issue rooms of every workspace and space the token is granted.
    #[arg(long, conflicts_with_all = ["workspace", "space"])]
    all: bool,
    #[command(flatten)]
    server: ServerArgs,
}

pub fn run(args: PurgeIssuesArgs, format: OutputFormat) -> anyhow::Result<()> {
    let request = scope_request(&args)?;
    let client = args.server.client()?;
    let report: CleanupReport = block_on(client.post("v1/rooms/cleanup/issues", &request))?
        .context("issue room purge failed")?;
    super::sweep::finish(format, &report)
}

fn scope_request(args: &PurgeIssuesArgs) -> anyhow::Result<CleanupScopeRequest> {
    if args.workspace.is_none() && args.space.is_none() && !args.all {
        return Err(UsageError(
            "refusing to purge every granted workspace without --all; pass --workspace or --space to narrow"
                .into(),
        )
        .into());
    }
    Ok(CleanupScopeRequest { workspace_slug: args.workspace.clone(), space_slug: args.space.clone() })
}
