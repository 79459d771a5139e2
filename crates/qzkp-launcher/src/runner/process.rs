use super::{RunnerError, RunnerResult};
use crate::model::ExitStatus;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Environment override applied to every child so progress lines are
/// flushed as they are printed instead of when the child's buffer fills.
pub const UNBUFFERED_ENV: (&str, &str) = ("PYTHONUNBUFFERED", "1");

/// Everything needed to start one child process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Program to execute (interpreter or script).
    pub program: String,
    /// Arguments passed after the program.
    pub args: Vec<String>,
    /// Working directory; inherits the parent's when `None`.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    #[must_use]
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// Human-readable command line, used in logs and status text.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Checks that `path` names an existing file that can be started.
///
/// When `needs_exec` is set (the script is run directly rather than through
/// an interpreter) the file must also carry an execute bit on unix.
pub fn ensure_launchable(path: &Path, needs_exec: bool) -> RunnerResult<()> {
    let metadata = std::fs::metadata(path).map_err(|err| {
        RunnerError::launch(
            format!("simulation script not found: {}", path.display()),
            err,
        )
    })?;
    if !metadata.is_file() {
        return Err(RunnerError::new(
            super::ErrorCode::Launch,
            format!("simulation script is not a file: {}", path.display()),
            None,
        ));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if needs_exec && metadata.permissions().mode() & 0o111 == 0 {
            return Err(RunnerError::new(
                super::ErrorCode::Launch,
                format!("simulation script is not executable: {}", path.display()),
                None,
            ));
        }
    }
    #[cfg(not(unix))]
    let _ = needs_exec;
    Ok(())
}

/// A spawned child process with piped standard streams.
///
/// Standard error is collected by a dedicated drain thread for the whole
/// lifetime of the child so that a chatty stderr cannot fill its pipe while
/// the caller is blocked reading standard output.
pub struct ProcessRunner {
    child: Child,
    stdout: Option<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<io::Result<String>>>,
    command_line: String,
    started_at: Instant,
}

impl ProcessRunner {
    /// Spawn the process described by `spec`.
    ///
    /// # Errors
    /// Returns `E_LAUNCH` if the program cannot be started and `E_IO` if the
    /// stderr drain thread cannot be created.
    pub fn spawn(spec: &LaunchSpec) -> RunnerResult<Self> {
        if spec.program.trim().is_empty() {
            return Err(RunnerError::new(
                super::ErrorCode::Launch,
                "no program to launch",
                None,
            ));
        }
        let command_line = spec.command_line();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        cmd.env(UNBUFFERED_ENV.0, UNBUFFERED_ENV.1);

        let mut child = cmd.spawn().map_err(|err| {
            RunnerError::launch(format!("failed to start `{command_line}`"), err)
        })?;
        tracing::debug!(pid = child.id(), command = %command_line, "spawned child process");

        let stdout = child.stdout.take().map(BufReader::new);
        let stderr = match child.stderr.take() {
            Some(pipe) => match spawn_stderr_drain(pipe) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    // Without a drain the child could block forever on stderr.
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RunnerError::io("failed to start stderr reader", err));
                }
            },
            None => None,
        };

        Ok(Self {
            child,
            stdout,
            stderr,
            command_line,
            started_at: Instant::now(),
        })
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    #[must_use]
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Lines written to standard output, ending when the child closes it.
    pub fn read_lines(&mut self) -> OutputLines<&mut BufReader<ChildStdout>> {
        OutputLines::new(self.stdout.as_mut())
    }

    /// Block until the child exits.
    pub fn wait(&mut self) -> RunnerResult<ExitStatus> {
        // Closing our end first lets a child still writing to stdout see EPIPE
        // instead of blocking on a reader that is gone.
        self.stdout = None;
        let status = self
            .child
            .wait()
            .map_err(|err| RunnerError::io("failed to wait for child process", err))?;
        let status = ExitStatus::from(status);
        tracing::debug!(
            pid = self.child.id(),
            exit_code = ?status.exit_code,
            signal = ?status.signal,
            "child process exited"
        );
        Ok(status)
    }

    /// Everything the child wrote to standard error.
    ///
    /// Call after [`ProcessRunner::wait`]; the drain finishes once the child
    /// (and any grandchildren holding the pipe) have exited. Subsequent calls
    /// return an empty string.
    pub fn drain_stderr(&mut self) -> RunnerResult<String> {
        let Some(handle) = self.stderr.take() else {
            return Ok(String::new());
        };
        match handle.join() {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(err)) => Err(RunnerError::io("failed to read child stderr", err)),
            Err(_) => Err(RunnerError::io(
                "failed to read child stderr",
                "stderr reader panicked",
            )),
        }
    }
}

fn spawn_stderr_drain<R>(mut pipe: R) -> io::Result<JoinHandle<io::Result<String>>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("qzkp-stderr".to_string())
        .spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(String::from_utf8_lossy(&buf).into_owned())
        })
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            success: status.success(),
            exit_code: status.code(),
            signal: exit_signal(status),
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: std::process::ExitStatus) -> Option<i32> {
    None
}

/// Lazy iterator over the lines of a child's output stream.
///
/// `\n`, `\r\n` and a bare `\r` all terminate a line, so carriage-return
/// progress updates arrive as separate lines. Invalid UTF-8 is replaced
/// rather than ending the stream. A read error ends the sequence.
pub struct OutputLines<R> {
    reader: Option<R>,
    buf: Vec<u8>,
    skip_lf: bool,
}

impl<R: BufRead> OutputLines<R> {
    pub fn new(reader: Option<R>) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            skip_lf: false,
        }
    }

    fn read_line(&mut self) -> io::Result<bool> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(false);
        };
        self.buf.clear();
        loop {
            let available = match reader.fill_buf() {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            if available.is_empty() {
                return Ok(!self.buf.is_empty());
            }
            if self.skip_lf {
                self.skip_lf = false;
                if available.first() == Some(&b'\n') {
                    reader.consume(1);
                    continue;
                }
            }
            match available.iter().position(|b| *b == b'\n' || *b == b'\r') {
                Some(pos) => {
                    let (line, rest) = available.split_at(pos);
                    self.buf.extend_from_slice(line);
                    self.skip_lf = rest.first() == Some(&b'\r');
                    reader.consume(pos + 1);
                    return Ok(true);
                }
                None => {
                    let len = available.len();
                    self.buf.extend_from_slice(available);
                    reader.consume(len);
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for OutputLines<R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        match self.read_line() {
            Ok(true) => Some(String::from_utf8_lossy(&self.buf).into_owned()),
            Ok(false) => {
                self.reader = None;
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "stopped reading child output");
                self.reader = None;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn lines_of(input: &[u8]) -> Vec<String> {
        OutputLines::new(Some(Cursor::new(input.to_vec()))).collect()
    }

    #[test]
    fn splits_on_all_line_terminators() {
        assert_eq!(
            lines_of(b"one\ntwo\r\nthree\rfour"),
            vec!["one", "two", "three", "four"]
        );
    }

    #[test]
    fn keeps_empty_lines() {
        assert_eq!(lines_of(b"a\n\nb\n"), vec!["a", "", "b"]);
    }

    #[test]
    fn empty_stream_yields_nothing() {
        assert!(lines_of(b"").is_empty());
        let mut none: OutputLines<Cursor<Vec<u8>>> = OutputLines::new(None);
        assert_eq!(none.next(), None);
    }

    #[test]
    fn replaces_invalid_utf8() {
        let lines = lines_of(b"ok \xff done\n");
        assert_eq!(lines, vec!["ok \u{fffd} done"]);
    }

    #[test]
    fn crlf_split_across_buffer_boundary_is_one_terminator() {
        let reader = BufReader::with_capacity(3, Cursor::new(b"ab\r\ncd\n".to_vec()));
        let lines: Vec<String> = OutputLines::new(Some(reader)).collect();
        assert_eq!(lines, vec!["ab", "cd"]);
    }

    #[test]
    fn command_line_joins_program_and_args() {
        let spec = LaunchSpec::new("python3").with_args(vec!["-u".into(), "sim.py".into()]);
        assert_eq!(spec.command_line(), "python3 -u sim.py");
    }

    #[test]
    fn spawn_rejects_empty_program() {
        let err = ProcessRunner::spawn(&LaunchSpec::new("  "))
            .err()
            .map(|err| err.code);
        assert_eq!(err, Some(super::super::ErrorCode::Launch));
    }
}
