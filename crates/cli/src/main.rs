// roomsync CLI entry point.

use clap::Parser;

mod client;
mod commands;
mod exit_code;
mod output;

use exit_code::{ExitCode, PartialFailure};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "roomsync", about = "Room keys, metadata resync and room cleanup")]
struct Cli {
    /// Force JSON output.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let format = OutputFormat::detect(cli.json);

    match commands::run(cli.command, format) {
        Ok(()) => ExitCode::Success.into(),
        Err(error) => {
            if error.downcast_ref::<PartialFailure>().is_none() {
                output::print_anyhow_error(format, &error);
            }
            ExitCode::from_error(&error).into()
        }
    }
}
