use crate::model::{RunId, SimulationVariant};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const RUN_RESULT_VERSION: u32 = 1;

/// Outcome of one completed run, delivered when the session finalizes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub run_result_version: u32,
    pub run_id: RunId,
    pub variant: SimulationVariant,
    pub status: RunStatus,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Wall-clock start, milliseconds since the Unix epoch.
    pub started_at_ms: u64,
    pub elapsed_ms: u64,
    pub exit_status: Option<ExitStatus>,
    /// Everything the child wrote to stderr; may be non-empty on success.
    pub stderr: String,
    /// Latest result file found after an iterative run.
    pub result_file: Option<PathBuf>,
    pub error: Option<ErrorInfo>,
}

impl RunResult {
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Seconds with one decimal, e.g. `"Total time: 12.3s"`.
    #[must_use]
    pub fn total_time_label(&self) -> String {
        format!("Total time: {:.1}s", self.elapsed().as_secs_f64())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The child exited with status zero.
    Succeeded,
    /// The child ran but exited unsuccessfully.
    ChildFailed,
    /// The child could not be started.
    LaunchFailed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExitStatus {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Status used when the exit status itself could not be collected.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            success: false,
            exit_code: None,
            signal: None,
        }
    }

    /// Short description such as `exit code 2` or `signal SIGKILL`.
    #[must_use]
    pub fn describe(&self) -> String {
        match (self.exit_code, self.signal) {
            (Some(code), _) => format!("exit code {code}"),
            (None, Some(signal)) => format!("signal {}", signal_name(signal)),
            (None, None) => "unknown status".to_string(),
        }
    }
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    nix::sys::signal::Signal::try_from(signal)
        .map_or_else(|_| signal.to_string(), |sig| sig.as_str().to_string())
}

#[cfg(not(unix))]
fn signal_name(signal: i32) -> String {
    signal.to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub context: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_prefers_exit_code() {
        let status = ExitStatus {
            success: false,
            exit_code: Some(2),
            signal: None,
        };
        assert_eq!(status.describe(), "exit code 2");
        assert_eq!(ExitStatus::unknown().describe(), "unknown status");
    }

    #[cfg(unix)]
    #[test]
    fn describe_names_signals() {
        let status = ExitStatus {
            success: false,
            exit_code: None,
            signal: Some(9),
        };
        assert_eq!(status.describe(), "signal SIGKILL");
    }

    #[test]
    fn run_status_serializes_snake_case() {
        let json = serde_json::to_string(&RunStatus::ChildFailed).ok();
        assert_eq!(json.as_deref(), Some("\"child_failed\""));
    }
}
