// Consistent exit codes for the roomsync CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   3  = bulk cleanup finished with failed rooms
//   11 = authentication error
//   13 = network error

use std::process;

use crate::client::ApiFailure;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Partial = 3,
    Auth = 11,
    Network = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if cause.downcast_ref::<PartialFailure>().is_some() {
                return Self::Partial;
            }
            if let Some(failure) = cause.downcast_ref::<ApiFailure>() {
                return Self::from_api_code(&failure.code);
            }
            if let Some(http_err) = cause.downcast_ref::<reqwest::Error>() {
                if http_err.is_connect() || http_err.is_timeout() {
                    return Self::Network;
                }
            }
            if cause.downcast_ref::<UsageError>().is_some() {
                return Self::Usage;
            }
        }

        Self::Error
    }

    /// Map a server error code to an exit code.
    pub fn from_api_code(code: &str) -> Self {
        match code {
            "AUTH_INVALID_TOKEN" | "AUTH_FORBIDDEN" => Self::Auth,
            "VALIDATION_FAILED" => Self::Usage,
            _ => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

/// Some rooms of a bulk cleanup could not be deleted. The report has already
/// been printed.
#[derive(Debug)]
pub struct PartialFailure {
    pub failed: usize,
}

impl std::fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} room(s) could not be deleted", self.failed)
    }
}

impl std::error::Error for PartialFailure {}

/// Invalid arguments that clap cannot express on its own.
#[derive(Debug)]
pub struct UsageError(pub String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}
