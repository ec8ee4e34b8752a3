// `roomsync delete`: delete the live room of one issue.

use clap::Args;
use roomsync_common::types::{DeleteRoomRequest, DeleteRoomResponse};
use uuid::Uuid;

use super::{block_on, ServerArgs};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Issue whose room should be deleted.
    #[arg(long)]
    issue: Uuid,
    /// Workspace slug, used when the issue has no stored room reference.
    #[arg(long)]
    workspace: Option<String>,
    /// Space slug of the issue, if any.
    #[arg(long)]
    space: Option<String>,
    #[command(flatten)]
    server: ServerArgs,
}

pub fn run(args: DeleteArgs, format: OutputFormat) -> anyhow::Result<()> {
    let client = args.server.client()?;
    let request = DeleteRoomRequest {
        issue_id: Some(args.issue.to_string()),
        workspace_slug: args.workspace,
        space_slug: args.space,
    };
    let response: DeleteRoomResponse = block_on(client.post("v1/rooms/delete", &request))??;
    output::print_output(format, &response, |response| format!("deleted {}", response.room_id))?;
    Ok(())
}
