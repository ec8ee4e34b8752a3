// `roomsync key`: derive a room key locally, without contacting the server.

use clap::Args;
use roomsync_common::room::{room_key, RoomEntity, RoomKind};
use serde::Serialize;
use uuid::Uuid;

use crate::exit_code::UsageError;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct KeyArgs {
    /// Workspace slug.
    workspace: String,
    /// Space slug, for entities that live in a space.
    #[arg(long)]
    space: Option<String>,
    /// Issue ID.
    #[arg(long, conflicts_with_all = ["project", "wiki"])]
    issue: Option<Uuid>,
    /// Project ID.
    #[arg(long, conflicts_with = "wiki")]
    project: Option<Uuid>,
    /// The wiki room of the workspace or space.
    #[arg(long)]
    wiki: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResult {
    pub room_id: String,
    pub kind: RoomKind,
}

pub fn run(args: KeyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let result = derive(&args)?;
    output::print_output(format, &result, |result| result.room_id.clone())?;
    Ok(())
}

fn derive(args: &KeyArgs) -> anyhow::Result<KeyResult> {
    let entity = match (args.issue, args.project, args.wiki) {
        (Some(id), None, false) => RoomEntity::Issue(id),
        (None, Some(id), false) => RoomEntity::Project(id),
        (None, None, true) => RoomEntity::Wiki,
        _ => {
            return Err(UsageError("pass exactly one of --issue, --project or --wiki".into()).into())
        }
    };

    let key = room_key(&args.workspace, entity, args.space.as_deref());
    Ok(KeyResult { kind: key.kind(), room_id: key.into_string() })
}
