// CLI subcommand dispatch.

use std::future::Future;

use anyhow::Context;
use clap::{Args, Subcommand};

use crate::client::ServerClient;
use crate::output::OutputFormat;

pub mod delete;
pub mod grant_patterns;
pub mod key;
pub mod purge_issues;
pub mod resync;
pub mod sweep;

#[derive(Subcommand)]
pub enum Command {
    /// Derive the room key of an issue, project or wiki
    Key(key::KeyArgs),
    /// Print the grant patterns a set of memberships yields
    GrantPatterns(grant_patterns::GrantPatternsArgs),
    /// Re-project one room's metadata on the server
    Resync(resync::ResyncArgs),
    /// Delete the live room of an issue
    Delete(delete::DeleteArgs),
    /// Delete live issue rooms that no issue references
    Sweep(sweep::SweepArgs),
    /// Bulk-delete issue rooms, optionally within one workspace or space
    PurgeIssues(purge_issues::PurgeIssuesArgs),
}

/// Connection flags shared by the commands that talk to the server.
#[derive(Debug, Args)]
pub struct ServerArgs {
    /// Server base URL (defaults to ROOMSYNC_URL, then http://localhost:8080).
    #[arg(long)]
    url: Option<String>,
    /// Bearer access token (defaults to ROOMSYNC_TOKEN).
    #[arg(long)]
    token: Option<String>,
}

impl ServerArgs {
    pub fn client(self) -> anyhow::Result<ServerClient> {
        ServerClient::from_flags(self.url, self.token)
    }
}

pub fn run(cmd: Command, format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        Command::Key(args) => key::run(args, format),
        Command::GrantPatterns(args) => grant_patterns::run(args, format),
        Command::Resync(args) => resync::run(args, format),
        Command::Delete(args) => delete::run(args, format),
        Command::Sweep(args) => sweep::run(args, format),
        Command::PurgeIssues(args) => purge_issues::run(args, format),
    }
}

/// Drive a server call to completion on a fresh current-thread runtime.
pub(crate) fn block_on<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    Ok(runtime.block_on(future))
}
