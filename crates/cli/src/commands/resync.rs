// `roomsync resync`: re-project one room's metadata on the server.

use clap::Args;
use roomsync_common::types::{ResyncRequest, ResyncResponse};

use super::{block_on, ServerArgs};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ResyncArgs {
    /// Room key to re-project.
    room_id: String,
    #[command(flatten)]
    server: ServerArgs,
}

pub fn run(args: ResyncArgs, format: OutputFormat) -> anyhow::Result<()> {
    let client = args.server.client()?;
    let request = ResyncRequest { room_id: Some(args.room_id) };
    let response: ResyncResponse = block_on(client.post("v1/rooms/resync", &request))??;
    output::print_output(format, &response, format_human)?;
    Ok(())
}

fn format_human(response: &ResyncResponse) -> String {
    let metadata = &response.metadata;
    let labels =
        if metadata.labels.is_empty() { "none".to_string() } else { metadata.labels.join(", ") };
    [
        format!("resynced {}", response.room_id),
        format!("  title:       {}", metadata.title),
        format!("  progress:    {}", metadata.progress),
        format!("  priority:    {}", metadata.priority),
        format!("  assigned to: {}", metadata.assigned_to),
        format!("  labels:      {labels}"),
    ]
    .join("\n")
}
