// `roomsync sweep`: delete live issue rooms that no issue references.

use anyhow::Context;
use clap::Args;
use roomsync_common::types::CleanupReport;
use serde_json::json;

use super::{block_on, ServerArgs};
use crate::exit_code::PartialFailure;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct SweepArgs {
    #[command(flatten)]
    server: ServerArgs,
}

pub fn run(args: SweepArgs, format: OutputFormat) -> anyhow::Result<()> {
    let client = args.server.client()?;
    let report: CleanupReport = block_on(client.post("v1/rooms/cleanup/orphans", &json!({})))?
        .context("orphan sweep failed")?;
    finish(format, &report)
}

/// Print a cleanup report; failed rooms turn into a non-zero exit.
pub(crate) fn finish(format: OutputFormat, report: &CleanupReport) -> anyhow::Result<()> {
    output::print_output(format, report, output::format_report)?;
    if report.success {
        Ok(())
    } else {
        Err(PartialFailure { failed: report.failed }.into())
    }
}
