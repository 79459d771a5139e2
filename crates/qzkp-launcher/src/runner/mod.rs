//! Child process supervision and the crate-wide error type.
//!
//! [`ProcessRunner`] owns one spawned simulation process: it exposes the
//! child's standard output as a lazy sequence of lines, waits for exit and
//! hands back everything the child wrote to standard error.
//!
//! Every fallible operation in this crate returns [`RunnerResult`]. Errors
//! carry a stable [`ErrorCode`] that the CLI maps to process exit codes.

mod process;

pub use process::{ensure_launchable, LaunchSpec, OutputLines, ProcessRunner, UNBUFFERED_ENV};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub type RunnerResult<T> = Result<T, RunnerError>;

/// Stable error codes surfaced to users and scripts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Invalid or missing numeric input; the run never starts.
    #[serde(rename = "E_PARAMETER")]
    Parameter,
    /// The child process could not be spawned.
    #[serde(rename = "E_LAUNCH")]
    Launch,
    /// The child exited unsuccessfully.
    #[serde(rename = "E_CHILD_FAILURE")]
    ChildFailure,
    /// No result file was found, or it could not be read.
    #[serde(rename = "E_RESULT_DISCOVERY")]
    ResultDiscovery,
    /// The launcher configuration is invalid.
    #[serde(rename = "E_CONFIG")]
    Config,
    /// A run was requested while another one is active.
    #[serde(rename = "E_SESSION_BUSY")]
    SessionBusy,
    /// Any other I/O failure.
    #[serde(rename = "E_IO")]
    Io,
    /// Invalid combination of command-line arguments.
    #[serde(rename = "E_CLI_INVALID_ARG")]
    CliInvalidArg,
}

impl ErrorCode {
    pub const ALL: [Self; 8] = [
        Self::Parameter,
        Self::Launch,
        Self::ChildFailure,
        Self::ResultDiscovery,
        Self::Config,
        Self::SessionBusy,
        Self::Io,
        Self::CliInvalidArg,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parameter => "E_PARAMETER",
            Self::Launch => "E_LAUNCH",
            Self::ChildFailure => "E_CHILD_FAILURE",
            Self::ResultDiscovery => "E_RESULT_DISCOVERY",
            Self::Config => "E_CONFIG",
            Self::SessionBusy => "E_SESSION_BUSY",
            Self::Io => "E_IO",
            Self::CliInvalidArg => "E_CLI_INVALID_ARG",
        }
    }

    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == code)
    }

    /// Process exit code used by the CLI for this error.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Parameter | Self::CliInvalidArg => 2,
            Self::Launch => 3,
            Self::ChildFailure => 4,
            Self::ResultDiscovery => 5,
            Self::Config => 6,
            Self::SessionBusy => 7,
            Self::Io => 8,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RunnerError {
    pub code: ErrorCode,
    pub message: String,
    pub context: Option<Value>,
}

impl RunnerError {
    pub fn new(code: ErrorCode, message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self {
            code,
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Parameter, message, None)
    }

    pub fn launch(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::Launch,
            message,
            serde_json::json!({ "source": err.to_string() }),
        )
    }

    pub fn child_failure(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::ChildFailure, message, context)
    }

    pub fn result_discovery(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::ResultDiscovery, message, context)
    }

    pub fn config(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::Config, message, context)
    }

    pub fn session_busy() -> Self {
        Self::new(
            ErrorCode::SessionBusy,
            "a simulation is already running",
            None,
        )
    }

    pub fn io(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::Io,
            message,
            serde_json::json!({ "source": err.to_string() }),
        )
    }

    pub fn cli_invalid_arg(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CliInvalidArg, message, None)
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }

    #[must_use]
    pub fn to_error_info(&self) -> crate::model::ErrorInfo {
        crate::model::ErrorInfo {
            code: self.code.as_str().to_string(),
            message: self.message.clone(),
            context: self.context.clone(),
        }
    }
}

impl Diagnostic for RunnerError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let hint = match self.code {
            ErrorCode::Parameter => "key length and iterations must be positive integers",
            ErrorCode::Launch => "check the interpreter and scripts_dir settings (see `qzkp show-config`)",
            ErrorCode::ResultDiscovery => "run an iterative simulation first",
            ErrorCode::Config => "configuration files may be JSON or YAML",
            ErrorCode::ChildFailure
            | ErrorCode::SessionBusy
            | ErrorCode::Io
            | ErrorCode::CliInvalidArg => return None,
        };
        Some(Box::new(hint))
    }
}
