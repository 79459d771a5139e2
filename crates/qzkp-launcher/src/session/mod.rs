//! Simulation sessions: one run at a time, supervised off the UI thread.
//!
//! A [`SimulationSession`] moves through
//! `Idle -> Validating -> Running -> Finalizing -> Idle`. While running, a
//! single worker thread owns the [`ProcessRunner`] and forwards every stdout
//! line, in order, over an `mpsc` channel. The owning thread drains that
//! channel with [`SimulationSession::pump`] (non-blocking, for event loops)
//! or [`SimulationSession::wait_finished`] (blocking, for batch use) and
//! receives callbacks on a [`SessionObserver`]. The worker never touches
//! presentation state.
//!
//! # Example
//!
//! ```no_run
//! use qzkp_launcher::session::{NoopObserver, SimulationSession};
//! use qzkp_launcher::{LauncherConfig, ParameterForm, SimulationVariant};
//!
//! # fn example() -> qzkp_launcher::runner::RunnerResult<()> {
//! let mut session = SimulationSession::new(LauncherConfig::default())?;
//! session.start(&ParameterForm::new(SimulationVariant::IdealAttack))?;
//! if let Some(result) = session.wait_finished(&mut NoopObserver) {
//!     println!("{}", result.total_time_label());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! There is no cancellation: once started, a child runs to completion.

use crate::config::env_overrides;
use crate::discovery::find_latest_result;
use crate::model::{
    ExitStatus, LauncherConfig, ParameterForm, RunId, RunResult, RunStatus, SessionId,
    SimulationParameters, SimulationVariant, RUN_RESULT_VERSION,
};
use crate::progress::{ProgressEvent, ProgressExtractor};
use crate::runner::{ensure_launchable, LaunchSpec, ProcessRunner, RunnerError, RunnerResult};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub const STATUS_READY: &str = "Ready";
pub const STATUS_RUNNING: &str = "Running simulation...";
pub const STATUS_FINISHED: &str = "Simulation finished. Ready.";
pub const NO_RESULTS_MESSAGE: &str = "No results CSV file found.";
/// Header of the section appended to the console when the child wrote to stderr.
pub const ERRORS_HEADER: &str = "\n--- ERRORS ---\n";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Validating,
    Running,
    Finalizing,
}

/// Messages from the worker thread, delivered in the order they were sent.
#[derive(Debug)]
pub enum SessionEvent {
    Started { pid: u32, command: String },
    Output(String),
    Progress(ProgressEvent),
    LaunchFailed(RunnerError),
    Exited { exit_status: ExitStatus, stderr: String },
}

/// Receives session callbacks on the thread that drains the session.
///
/// Every method has an empty default so observers implement only what they
/// display.
pub trait SessionObserver {
    /// A line for the console, without its terminator.
    fn on_output(&mut self, _line: &str) {}
    fn on_progress(&mut self, _event: &ProgressEvent) {}
    /// Short status-bar text.
    fn on_status(&mut self, _status: &str) {}
    /// Outcome of result discovery after an iterative run.
    fn on_result_file(&mut self, _path: Option<&Path>) {}
    fn on_finished(&mut self, _result: &RunResult) {}
}

/// Discards every callback.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

struct ActiveRun {
    run_id: RunId,
    variant: SimulationVariant,
    spec: LaunchSpec,
    started: Instant,
    started_at_ms: u64,
    events: Receiver<SessionEvent>,
    worker: Option<JoinHandle<()>>,
}

pub struct SimulationSession {
    id: SessionId,
    config: LauncherConfig,
    extractor: ProgressExtractor,
    state: SessionState,
    active: Option<ActiveRun>,
    last_result: Option<RunResult>,
}

impl SimulationSession {
    /// Create an idle session.
    ///
    /// # Errors
    /// Returns `E_CONFIG` if the configured progress pattern is invalid.
    pub fn new(config: LauncherConfig) -> RunnerResult<Self> {
        let extractor = ProgressExtractor::from_config(config.progress_pattern.as_deref())?;
        Ok(Self {
            id: SessionId::new(),
            config,
            extractor,
            state: SessionState::Idle,
            active: None,
            last_result: None,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state != SessionState::Idle
    }

    #[must_use]
    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Result of the most recently finished run.
    #[must_use]
    pub fn last_result(&self) -> Option<&RunResult> {
        self.last_result.as_ref()
    }

    /// Wall-clock time of the active run.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.active.as_ref().map(|run| run.started.elapsed())
    }

    /// Script the session will start for `variant`, anchored to the
    /// working directory so the existence check and the child agree.
    #[must_use]
    pub fn script_path(&self, variant: SimulationVariant) -> PathBuf {
        let script = self.config.script_path(variant);
        if script.is_absolute() {
            return script;
        }
        let base = match (&self.config.working_dir, std::env::current_dir()) {
            (Some(dir), Ok(cwd)) => cwd.join(dir),
            (Some(dir), Err(_)) => dir.clone(),
            (None, Ok(cwd)) => cwd,
            (None, Err(_)) => return script,
        };
        base.join(script)
    }

    /// The exact command a run with `params` would execute.
    #[must_use]
    pub fn build_launch_spec(&self, params: &SimulationParameters) -> LaunchSpec {
        let script = self.script_path(params.variant()).display().to_string();
        let (program, mut args) = match &self.config.interpreter {
            Some(interpreter) => {
                let mut args = self.config.interpreter_args.clone();
                args.push(script);
                (interpreter.clone(), args)
            }
            None => (script, Vec::new()),
        };
        args.extend(params.to_args());
        LaunchSpec::new(program)
            .with_args(args)
            .with_cwd(self.config.working_dir.clone())
            .with_env(env_overrides(&self.config))
    }

    /// Validate `form` and start the simulation on a worker thread.
    ///
    /// # Errors
    /// `E_SESSION_BUSY` if a run is active, `E_PARAMETER` if the form is
    /// invalid (the session stays idle), `E_IO` if the worker thread cannot
    /// be created. Launch failures are reported through the observer.
    pub fn start(&mut self, form: &ParameterForm) -> RunnerResult<RunId> {
        if self.state != SessionState::Idle {
            return Err(RunnerError::session_busy());
        }
        self.state = SessionState::Validating;
        let params = match form.validate() {
            Ok(params) => params,
            Err(err) => {
                self.state = SessionState::Idle;
                return Err(err);
            }
        };

        let run_id = RunId::new();
        let variant = params.variant();
        let spec = self.build_launch_spec(&params);
        let script = self.script_path(variant);
        let needs_exec = self.config.interpreter.is_none();
        let extractor = self.extractor.clone();
        let (tx, rx) = mpsc::channel();
        let worker_spec = spec.clone();
        let worker = thread::Builder::new()
            .name("qzkp-session".to_string())
            .spawn(move || run_worker(&worker_spec, &script, needs_exec, &extractor, &tx))
            .map_err(|err| {
                self.state = SessionState::Idle;
                RunnerError::io("failed to start session worker", err)
            })?;

        tracing::info!(
            session = %self.id,
            run = %run_id,
            variant = ?variant,
            command = %spec.command_line(),
            "simulation started"
        );
        self.active = Some(ActiveRun {
            run_id,
            variant,
            spec,
            started: Instant::now(),
            started_at_ms: unix_millis(),
            events: rx,
            worker: Some(worker),
        });
        self.state = SessionState::Running;
        Ok(run_id)
    }

    /// Dispatch every event that has already arrived, without blocking.
    ///
    /// Returns the run result when this call finalized the run.
    pub fn pump(&mut self, observer: &mut dyn SessionObserver) -> Option<RunResult> {
        loop {
            let event = match self.active.as_ref()?.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => return self.worker_lost(observer),
            };
            if let Some(result) = self.dispatch(event, observer) {
                return Some(result);
            }
        }
    }

    /// Dispatch events until the active run finishes.
    ///
    /// Returns `None` immediately when no run is active.
    pub fn wait_finished(&mut self, observer: &mut dyn SessionObserver) -> Option<RunResult> {
        loop {
            let event = match self.active.as_ref()?.events.recv() {
                Ok(event) => event,
                Err(RecvError) => return self.worker_lost(observer),
            };
            if let Some(result) = self.dispatch(event, observer) {
                return Some(result);
            }
        }
    }

    fn dispatch(
        &mut self,
        event: SessionEvent,
        observer: &mut dyn SessionObserver,
    ) -> Option<RunResult> {
        match event {
            SessionEvent::Started { pid, command } => {
                tracing::debug!(session = %self.id, pid, command = %command, "child running");
                observer.on_status(STATUS_RUNNING);
                None
            }
            SessionEvent::Output(line) => {
                observer.on_output(&line);
                None
            }
            SessionEvent::Progress(progress) => {
                observer.on_progress(&progress);
                None
            }
            SessionEvent::LaunchFailed(err) => self.finish_launch_failed(err, observer),
            SessionEvent::Exited {
                exit_status,
                stderr,
            } => self.finish_exited(exit_status, stderr, observer),
        }
    }

    fn finish_launch_failed(
        &mut self,
        err: RunnerError,
        observer: &mut dyn SessionObserver,
    ) -> Option<RunResult> {
        let run = self.active.take()?;
        self.state = SessionState::Finalizing;
        tracing::warn!(session = %self.id, error = %err, "simulation failed to launch");
        observer.on_output(&format!("Error: {}", err.message));
        observer.on_status(&format!("Launch error: {}", err.message));
        let outcome = Outcome {
            status: RunStatus::LaunchFailed,
            exit_status: None,
            stderr: String::new(),
            error: Some(err),
        };
        Some(self.complete(run, outcome, observer))
    }

    fn finish_exited(
        &mut self,
        exit_status: ExitStatus,
        stderr: String,
        observer: &mut dyn SessionObserver,
    ) -> Option<RunResult> {
        let run = self.active.take()?;
        self.state = SessionState::Finalizing;
        if !stderr.is_empty() {
            observer.on_output(&format!("{ERRORS_HEADER}{stderr}"));
        }
        let (status, error) = if exit_status.success {
            (RunStatus::Succeeded, None)
        } else {
            let err = RunnerError::child_failure(
                format!("simulation exited with {}", exit_status.describe()),
                serde_json::json!({
                    "exit_code": exit_status.exit_code,
                    "signal": exit_status.signal,
                }),
            );
            tracing::warn!(session = %self.id, error = %err, "simulation failed");
            (RunStatus::ChildFailed, Some(err))
        };
        if run.variant.is_iterative() {
            observer.on_progress(&ProgressEvent::new(100.0));
        }
        let outcome = Outcome {
            status,
            exit_status: Some(exit_status),
            stderr,
            error,
        };
        Some(self.complete(run, outcome, observer))
    }

    /// The worker hung up without reporting an exit; treat as a launch failure.
    fn worker_lost(&mut self, observer: &mut dyn SessionObserver) -> Option<RunResult> {
        let err = RunnerError::io("session worker stopped unexpectedly", "channel closed");
        self.finish_launch_failed(err, observer)
    }

    fn complete(
        &mut self,
        mut run: ActiveRun,
        outcome: Outcome,
        observer: &mut dyn SessionObserver,
    ) -> RunResult {
        let result_file =
            if run.variant.is_iterative() && outcome.status != RunStatus::LaunchFailed {
                self.discover_results(observer)
            } else {
                None
            };
        if let Some(worker) = run.worker.take() {
            if worker.join().is_err() {
                tracing::warn!(session = %self.id, "session worker panicked");
            }
        }
        let result = RunResult {
            run_result_version: RUN_RESULT_VERSION,
            run_id: run.run_id,
            variant: run.variant,
            status: outcome.status,
            command: run.spec.program,
            args: run.spec.args,
            cwd: run.spec.cwd,
            started_at_ms: run.started_at_ms,
            elapsed_ms: u64::try_from(run.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            exit_status: outcome.exit_status,
            stderr: outcome.stderr,
            result_file,
            error: outcome.error.map(|err| err.to_error_info()),
        };
        match (result.status, &result.exit_status) {
            (RunStatus::LaunchFailed, _) => {}
            (_, Some(exit)) if !exit.success => {
                observer.on_status(&format!(
                    "Simulation finished with {}. Ready.",
                    exit.describe()
                ));
            }
            _ => observer.on_status(STATUS_FINISHED),
        }
        tracing::info!(
            session = %self.id,
            run = %result.run_id,
            status = ?result.status,
            elapsed_ms = result.elapsed_ms,
            "simulation finished"
        );
        observer.on_finished(&result);
        self.last_result = Some(result.clone());
        self.state = SessionState::Idle;
        result
    }

    fn discover_results(&self, observer: &mut dyn SessionObserver) -> Option<PathBuf> {
        match find_latest_result(self.config.results_dir()) {
            Ok(Some(path)) => {
                observer.on_output(&format!("Results file: {}", path.display()));
                observer.on_result_file(Some(&path));
                Some(path)
            }
            Ok(None) => {
                observer.on_output(NO_RESULTS_MESSAGE);
                observer.on_result_file(None);
                None
            }
            Err(err) => {
                observer.on_output(&format!("Error finding results: {}", err.message));
                observer.on_result_file(None);
                None
            }
        }
    }
}

/// How a run ended, before it is folded into a [`RunResult`].
struct Outcome {
    status: RunStatus,
    exit_status: Option<ExitStatus>,
    stderr: String,
    error: Option<RunnerError>,
}

/// Body of the worker thread. Send failures mean the session was dropped;
/// the child is still waited for so it is reaped.
fn run_worker(
    spec: &LaunchSpec,
    script: &Path,
    needs_exec: bool,
    extractor: &ProgressExtractor,
    tx: &Sender<SessionEvent>,
) {
    if let Err(err) = ensure_launchable(script, needs_exec) {
        let _ = tx.send(SessionEvent::LaunchFailed(err));
        return;
    }
    let mut process = match ProcessRunner::spawn(spec) {
        Ok(process) => process,
        Err(err) => {
            let _ = tx.send(SessionEvent::LaunchFailed(err));
            return;
        }
    };
    let _ = tx.send(SessionEvent::Started {
        pid: process.pid(),
        command: process.command_line().to_string(),
    });
    for line in process.read_lines() {
        let progress = extractor.extract(&line);
        let _ = tx.send(SessionEvent::Output(line));
        if let Some(progress) = progress {
            let _ = tx.send(SessionEvent::Progress(progress));
        }
    }
    let exit_status = process.wait().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "could not collect exit status");
        ExitStatus::unknown()
    });
    let stderr = process.drain_stderr().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "could not collect stderr");
        String::new()
    });
    let _ = tx.send(SessionEvent::Exited {
        exit_status,
        stderr,
    });
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Records every callback, for tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CollectingObserver {
    pub output: Vec<String>,
    pub progress: Vec<f64>,
    pub statuses: Vec<String>,
    pub result_files: Vec<Option<PathBuf>>,
    pub finished: Vec<RunResult>,
}

#[cfg(test)]
impl SessionObserver for CollectingObserver {
    fn on_output(&mut self, line: &str) {
        self.output.push(line.to_string());
    }

    fn on_progress(&mut self, event: &ProgressEvent) {
        self.progress.push(event.percent());
    }

    fn on_status(&mut self, status: &str) {
        self.statuses.push(status.to_string());
    }

    fn on_result_file(&mut self, path: Option<&Path>) {
        self.result_files.push(path.map(Path::to_path_buf));
    }

    fn on_finished(&mut self, result: &RunResult) {
        self.finished.push(result.clone());
    }
}
