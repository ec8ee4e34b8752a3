// Output format auto-detection for the CLI.
//
// TTY → human-readable text. Piped/redirected → structured JSON.
// `--json` flag forces JSON output regardless of terminal.

use std::io::{self, IsTerminal, Write};

use roomsync_common::types::{CleanupReport, RoomOutcomeStatus};
use serde::Serialize;

use crate::client::ApiFailure;

const ANSI_RED: &str = "\x1b[31m";
const ANSI_RESET: &str = "\x1b[0m";

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Human,
    /// Machine-readable JSON (one object per response).
    Json,
}

impl OutputFormat {
    /// Auto-detect format: JSON if `--json` was passed or stdout is not a TTY.
    pub fn detect(json_flag: bool) -> Self {
        if json_flag {
            return Self::Json;
        }
        Self::detect_from_terminal(io::stdout().is_terminal())
    }

    /// Testable variant that takes an explicit `is_tty` flag.
    pub fn detect_from_terminal(is_tty: bool) -> Self {
        if is_tty {
            Self::Human
        } else {
            Self::Json
        }
    }
}

/// Write a value to stdout in the selected format.
pub fn print_output<T, F>(format: OutputFormat, value: &T, human_fn: F) -> io::Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    write_output(&mut io::stdout().lock(), format, value, human_fn)
}

/// Write a value to a provided writer (useful for testing).
pub fn write_output<W, T, F>(
    writer: &mut W,
    format: OutputFormat,
    value: &T,
    human_fn: F,
) -> io::Result<()>
where
    W: Write,
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Human => {
            writeln!(writer, "{}", human_fn(value))
        }
        OutputFormat::Json => {
            serde_json::to_writer(&mut *writer, value).map_err(io::Error::other)?;
            writeln!(writer)
        }
    }
}

/// Write an error to stderr in the selected format.
pub fn print_error(format: OutputFormat, code: &str, message: &str) {
    let mut err = io::stderr().lock();
    match format {
        OutputFormat::Human => {
            let line = render_human_stderr_line("error", message, io::stderr().is_terminal());
            let _ = writeln!(err, "{line}");
        }
        OutputFormat::Json => {
            let obj = serde_json::json!({
                "error": {
                    "code": code,
                    "message": message,
                }
            });
            let _ = serde_json::to_writer(&mut err, &obj);
            let _ = writeln!(err);
        }
    }
}

/// Print a mapped, actionable error for a command failure.
pub fn print_anyhow_error(format: OutputFormat, error: &anyhow::Error) {
    let (code, message) = actionable_error(error);
    print_error(format, &code, &message);
}

fn actionable_error(error: &anyhow::Error) -> (String, String) {
    let message = format!("{error:#}");

    if let Some(failure) = error.chain().find_map(|cause| cause.downcast_ref::<ApiFailure>()) {
        let hint = match failure.code.as_str() {
            "AUTH_INVALID_TOKEN" => {
                Some("Set a valid access token with --token or ROOMSYNC_TOKEN.")
            }
            "AUTH_FORBIDDEN" => Some("The room is outside your workspaces and spaces."),
            "UPSTREAM_FAILURE" => Some("A backing store failed; retrying may succeed."),
            _ => None,
        };
        let message = match hint {
            Some(hint) => format!("{message}. {hint}"),
            None => message,
        };
        return (failure.code.clone(), message);
    }

    let lower = message.to_ascii_lowercase();
    if lower.contains("failed to reach server") {
        return (
            "SERVER_UNREACHABLE".to_string(),
            format!("{message}. Check --url or ROOMSYNC_URL."),
        );
    }

    ("CLI_ERROR".to_string(), message)
}

fn render_human_stderr_line(label: &str, message: &str, is_tty: bool) -> String {
    if is_tty {
        format!("{ANSI_RED}{label}:{ANSI_RESET} {message}")
    } else {
        format!("{label}: {message}")
    }
}

/// Human rendering of a sweep or bulk deletion report.
pub fn format_report(report: &CleanupReport) -> String {
    let mut lines = vec![report.message.clone()];
    for outcome in &report.results {
        match outcome.status {
            RoomOutcomeStatus::Deleted => lines.push(format!("  deleted  {}", outcome.room_id)),
            RoomOutcomeStatus::Error => lines.push(format!(
                "  FAILED   {} ({})",
                outcome.room_id,
                outcome.error.as_deref().unwrap_or("unknown error")
            )),
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use roomsync_common::types::RoomOutcome;

    use super::*;

    #[test]
    fn detect_tty_returns_human() {
        assert_eq!(OutputFormat::detect_from_terminal(true), OutputFormat::Human);
    }

    #[test]
    fn detect_pipe_returns_json() {
        assert_eq!(OutputFormat::detect_from_terminal(false), OutputFormat::Json);
    }

    #[test]
    fn detect_json_flag_overrides_tty() {
        assert_eq!(OutputFormat::detect(true), OutputFormat::Json);
    }

    #[test]
    fn write_output_human_format() {
        #[derive(Serialize)]
        struct Info {
            room: String,
        }
        let info = Info { room: "tracker-acme-wiki".into() };
        let mut buf = Vec::new();
        write_output(&mut buf, OutputFormat::Human, &info, |i| format!("Room: {}", i.room))
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "Room: tracker-acme-wiki\n");
    }

    #[test]
    fn write_output_json_does_not_call_human_fn() {
        let report = CleanupReport::from_outcomes("orphaned rooms", vec![]);
        let mut buf = Vec::new();
        write_output(&mut buf, OutputFormat::Json, &report, |_| {
            panic!("human_fn should not be called in JSON mode")
        })
        .unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert!(output.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(parsed["message"], "no orphaned rooms found");
        assert_eq!(parsed["success"], true);
    }

    #[test]
    fn report_lists_failures_with_reason() {
        let report = CleanupReport::from_outcomes(
            "issue rooms",
            vec![RoomOutcome::deleted("tracker-a-1"), RoomOutcome::failed("tracker-a-2", "503")],
        );
        let text = format_report(&report);
        assert!(text.starts_with("deleted 1 of 2 issue rooms; 1 failed"));
        assert!(text.contains("deleted  tracker-a-1"));
        assert!(text.contains("FAILED   tracker-a-2 (503)"));
    }

    #[test]
    fn render_human_error_uses_color_for_tty() {
        let line = render_human_stderr_line("error", "boom", true);
        assert!(line.contains(ANSI_RED));
        assert!(line.contains("boom"));
        assert_eq!(render_human_stderr_line("error", "boom", false), "error: boom");
    }

    #[test]
    fn actionable_error_uses_server_code_and_hint() {
        let err = anyhow::Error::new(ApiFailure {
            status: 401,
            code: "AUTH_INVALID_TOKEN".into(),
            message: "missing bearer token".into(),
            retryable: false,
        })
        .context("resync failed");
        let (code, message) = actionable_error(&err);
        assert_eq!(code, "AUTH_INVALID_TOKEN");
        assert!(message.contains("ROOMSYNC_TOKEN"));
    }

    #[test]
    fn actionable_error_unreachable_server() {
        let err = anyhow::anyhow!("failed to reach server at http://localhost:8080/v1/rooms/resync");
        let (code, message) = actionable_error(&err);
        assert_eq!(code, "SERVER_UNREACHABLE");
        assert!(message.contains("ROOMSYNC_URL"));
    }

    #[test]
    fn actionable_error_fallback() {
        let (code, message) = actionable_error(&anyhow::anyhow!("something odd"));
        assert_eq!(code, "CLI_ERROR");
        assert_eq!(message, "something odd");
    }
}
