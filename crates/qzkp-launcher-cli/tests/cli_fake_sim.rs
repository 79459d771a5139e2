//! `qzkp run` driving the `qzkp-fake-sim` binary directly, without an
//! interpreter.
// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::print_stderr)]
#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use qzkp_launcher_fixtures::{sibling_binary, write_config};
use serde_json::{json, Value};
use tempfile::TempDir;

/// The fixture binary is built with the fixtures crate; without it there is
/// nothing to run.
fn fake_sim() -> Option<PathBuf> {
    let path = sibling_binary(Path::new(env!("CARGO_BIN_EXE_qzkp")), "qzkp-fake-sim");
    if path.exists() {
        Some(path)
    } else {
        eprintln!(
            "skipping: {} not built. Run 'cargo build --workspace' first.",
            path.display()
        );
        None
    }
}

fn run_fake(work: &Path, sim: &Path, env: &Value, args: &[&str]) -> Output {
    let name = sim.file_name().and_then(|name| name.to_str()).unwrap();
    let config = work.join("qzkp.json");
    write_config(
        &config,
        &json!({
            "interpreter": null,
            "scripts_dir": sim.parent().unwrap(),
            "scripts": { "ideal_attack": name, "flip_noise": name },
            "working_dir": work,
            "env": { "set": env },
        }),
    );
    Command::new(env!("CARGO_BIN_EXE_qzkp"))
        .args(["run", "--config"])
        .arg(&config)
        .args(args)
        .output()
        .expect("failed to execute qzkp")
}

#[test]
fn iterative_run_finds_the_result_file() {
    let Some(sim) = fake_sim() else { return };
    let work = TempDir::new().unwrap();

    let output = run_fake(
        work.path(),
        &sim,
        &json!({}),
        &["--variant", "ideal-attack", "--iterations", "4", "--json"],
    );

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["status"], "succeeded");
    assert_eq!(
        result["result_file"],
        json!(work.path().join("fake_results.csv"))
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Iteration 4/4 complete 100.00%"));
}

#[test]
fn flip_arguments_reach_the_simulation() {
    let Some(sim) = fake_sim() else { return };
    let work = TempDir::new().unwrap();

    let output = run_fake(
        work.path(),
        &sim,
        &json!({}),
        &[
            "--variant",
            "flip",
            "--iterations",
            "1",
            "--noise-a",
            "0.1",
            "--no-attacker",
        ],
    );

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Iterative run: key=64 iterations=1 0.1000 0.0200 False"));
}

#[test]
fn failing_run_still_reports_results_and_stderr() {
    let Some(sim) = fake_sim() else { return };
    let work = TempDir::new().unwrap();

    let output = run_fake(
        work.path(),
        &sim,
        &json!({ "QZKP_FAKE_EXIT": "1", "QZKP_FAKE_STDERR": "numerical warning" }),
        &["--variant", "ideal-attack", "--iterations", "2"],
    );

    assert_eq!(output.status.code(), Some(4));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--- ERRORS ---\nnumerical warning"));
    assert!(stdout.contains("Results file: "));
}

#[test]
fn missing_result_file_is_reported_in_the_console() {
    let Some(sim) = fake_sim() else { return };
    let work = TempDir::new().unwrap();

    let output = run_fake(
        work.path(),
        &sim,
        &json!({ "QZKP_FAKE_NO_CSV": "1" }),
        &["--variant", "ideal-attack", "--iterations", "1"],
    );

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No results CSV file found."));
}
