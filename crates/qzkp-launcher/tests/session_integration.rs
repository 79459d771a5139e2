// Test module - relaxed lint rules
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]
#![allow(clippy::manual_assert)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::float_cmp)]
#![allow(missing_docs)]
#![cfg(unix)]

//! Session integration tests
//!
//! Drives `SimulationSession` and `run_simulation` against fake simulation
//! scripts run through `sh`.

use std::fs;
use std::path::Path;

use qzkp_launcher::model::{LauncherConfig, NoiseInput, ParameterForm, RunStatus, SimulationVariant};
use qzkp_launcher::progress::ProgressEvent;
use qzkp_launcher::run::run_simulation;
use qzkp_launcher::session::{SessionObserver, SessionState, SimulationSession};
use qzkp_launcher::RunResult;
use qzkp_launcher_fixtures::{temp_dir, write_script, FakeSimulation};

// =============================================================================
// Helper Functions
// =============================================================================

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
    finished: Option<RunResult>,
}

impl SessionObserver for Recorder {
    fn on_output(&mut self, line: &str) {
        self.events.push(format!("out:{line}"));
    }

    fn on_progress(&mut self, event: &ProgressEvent) {
        self.events.push(format!("progress:{}", event.percent()));
    }

    fn on_status(&mut self, status: &str) {
        self.events.push(format!("status:{status}"));
    }

    fn on_result_file(&mut self, path: Option<&Path>) {
        let name = path
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned());
        self.events.push(format!("result:{}", name.unwrap_or_default()));
    }

    fn on_finished(&mut self, result: &RunResult) {
        self.finished = Some(result.clone());
    }
}

fn sh_config(dir: &Path) -> LauncherConfig {
    LauncherConfig {
        interpreter: Some("sh".to_string()),
        interpreter_args: Vec::new(),
        scripts_dir: Some(dir.to_path_buf()),
        working_dir: Some(dir.to_path_buf()),
        ..LauncherConfig::default()
    }
}

fn damping_form() -> ParameterForm {
    ParameterForm {
        key_length: "32".to_string(),
        iterations: "4".to_string(),
        noise_a: NoiseInput::Slider(25),
        noise_b: NoiseInput::Text("0.1".to_string()),
        ..ParameterForm::new(SimulationVariant::DampingNoise)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn events_arrive_in_emission_order() {
    let dir = temp_dir("order");
    FakeSimulation::new()
        .echo_args()
        .with_line("setting up")
        .with_progress(&[25.0, 50.0])
        .with_line("between")
        .with_progress(&[75.0, 100.0])
        .with_results_csv("damping.csv", &[(1, 40.0, 0), (2, 60.0, 1)])
        .write(&dir, SimulationVariant::DampingNoise.default_script());

    let mut session = SimulationSession::new(sh_config(&dir)).unwrap();
    let mut recorder = Recorder::default();
    session.start(&damping_form()).unwrap();
    let result = session.wait_finished(&mut recorder).unwrap();

    assert_eq!(
        recorder.events,
        vec![
            "status:Running simulation...".to_string(),
            "out:args: 32 4 0.2500 0.1000 True".to_string(),
            "out:setting up".to_string(),
            "out:Progress: 25.00%".to_string(),
            "progress:25".to_string(),
            "out:Progress: 50.00%".to_string(),
            "progress:50".to_string(),
            "out:between".to_string(),
            "out:Progress: 75.00%".to_string(),
            "progress:75".to_string(),
            "out:Progress: 100.00%".to_string(),
            "progress:100".to_string(),
            "progress:100".to_string(),
            format!("out:Results file: {}", dir.join("damping.csv").display()),
            "result:damping.csv".to_string(),
            "status:Simulation finished. Ready.".to_string(),
        ]
    );
    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(recorder.finished.map(|r| r.run_id), Some(result.run_id));
    assert_eq!(session.state(), SessionState::Idle);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn pump_delivers_everything_eventually() {
    let dir = temp_dir("pump");
    FakeSimulation::new()
        .with_progress(&[10.0, 20.0, 30.0])
        .write(&dir, SimulationVariant::Basic.default_script());

    let mut session = SimulationSession::new(sh_config(&dir)).unwrap();
    let mut recorder = Recorder::default();
    session.start(&ParameterForm::default()).unwrap();
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    let result = loop {
        if let Some(result) = session.pump(&mut recorder) {
            break result;
        }
        assert!(std::time::Instant::now() < deadline, "run did not finish");
        assert!(session.elapsed().is_some());
        std::thread::sleep(std::time::Duration::from_millis(10));
    };

    let progress: Vec<&String> = recorder
        .events
        .iter()
        .filter(|event| event.starts_with("progress:"))
        .collect();
    assert_eq!(progress, vec!["progress:10", "progress:20", "progress:30"]);
    assert!(result.succeeded());
    assert!(session.elapsed().is_none());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn stderr_and_failure_are_reported_without_breaking_the_session() {
    let dir = temp_dir("failure");
    FakeSimulation::new()
        .with_line("partial")
        .with_stderr("Traceback: boom\n")
        .with_exit_code(1)
        .write(&dir, SimulationVariant::IdealAttack.default_script());

    let mut recorder = Recorder::default();
    let form = ParameterForm::new(SimulationVariant::IdealAttack);
    let result = run_simulation(sh_config(&dir), &form, &mut recorder).unwrap();

    assert_eq!(result.status, RunStatus::ChildFailed);
    assert_eq!(result.stderr, "Traceback: boom\n");
    assert!(recorder
        .events
        .contains(&"out:\n--- ERRORS ---\nTraceback: boom\n".to_string()));
    assert!(recorder
        .events
        .contains(&"out:No results CSV file found.".to_string()));
    assert_eq!(
        recorder.events.last().map(String::as_str),
        Some("status:Simulation finished with exit code 1. Ready.")
    );
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn script_run_directly_must_be_executable() {
    let dir = temp_dir("direct");
    let script = dir.join(SimulationVariant::Basic.default_script());
    fs::write(&script, "#!/bin/sh\necho direct\n").unwrap();
    let config = LauncherConfig {
        interpreter: None,
        ..sh_config(&dir)
    };

    let result = run_simulation(config.clone(), &ParameterForm::default(), &mut Recorder::default())
        .unwrap();
    assert_eq!(result.status, RunStatus::LaunchFailed);
    assert_eq!(result.error.map(|e| e.code), Some("E_LAUNCH".to_string()));

    FakeSimulation::new()
        .with_line("direct")
        .write(&dir, SimulationVariant::Basic.default_script());
    let mut recorder = Recorder::default();
    let result = run_simulation(config, &ParameterForm::default(), &mut recorder).unwrap();
    assert_eq!(result.status, RunStatus::Succeeded);
    assert!(recorder.events.contains(&"out:direct".to_string()));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn configured_environment_reaches_the_child() {
    let dir = temp_dir("env");
    write_script(
        &dir,
        SimulationVariant::Basic.default_script(),
        "echo \"unbuffered=$PYTHONUNBUFFERED custom=$QZKP_TEST_VALUE\"\n",
    );
    let mut config = sh_config(&dir);
    config
        .env
        .set
        .insert("QZKP_TEST_VALUE".to_string(), "42".to_string());

    let mut recorder = Recorder::default();
    run_simulation(config, &ParameterForm::default(), &mut recorder).unwrap();
    assert!(recorder
        .events
        .contains(&"out:unbuffered=1 custom=42".to_string()));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn custom_progress_pattern_is_honoured() {
    let dir = temp_dir("pattern");
    FakeSimulation::new()
        .with_line("step 3 of 4 [75]")
        .with_line("12.50% is not matched any more")
        .write(&dir, SimulationVariant::Basic.default_script());
    let config = LauncherConfig {
        progress_pattern: Some(r"\[(\d+)\]".to_string()),
        ..sh_config(&dir)
    };

    let mut recorder = Recorder::default();
    run_simulation(config, &ParameterForm::default(), &mut recorder).unwrap();
    let progress: Vec<&String> = recorder
        .events
        .iter()
        .filter(|event| event.starts_with("progress:"))
        .collect();
    assert_eq!(progress, vec!["progress:75"]);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn result_json_round_trips() {
    let dir = temp_dir("json");
    FakeSimulation::new().write(&dir, SimulationVariant::Basic.default_script());
    let result =
        run_simulation(sh_config(&dir), &ParameterForm::default(), &mut Recorder::default())
            .unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], "succeeded");
    assert_eq!(json["variant"], "basic");
    assert_eq!(json["args"].as_array().map(Vec::len), Some(3));
    let _ = fs::remove_dir_all(&dir);
}
