//! Fluent builder for fake simulation scripts.
//!
//! A [`FakeSimulation`] renders a small POSIX shell script that behaves like
//! one of the real simulations: it echoes its arguments, prints progress
//! lines, optionally writes a result CSV and stderr text, and exits with a
//! chosen code. Run it with `interpreter: "sh"` in the launcher config.
//!
//! # Example
//!
//! ```ignore
//! use qzkp_launcher_fixtures::{temp_dir, FakeSimulation};
//!
//! let dir = temp_dir("example");
//! FakeSimulation::new()
//!     .with_progress(&[25.0, 50.0, 100.0])
//!     .with_results_csv("run.csv", &[(1, 50.0, 0), (2, 75.0, 1)])
//!     .write(&dir, "QZKP_attack_ideal.py");
//! ```

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::helpers::write_script;

#[derive(Debug, Clone, Default)]
pub struct FakeSimulation {
    lines: Vec<String>,
    stderr: Option<String>,
    results: Option<(String, Vec<(u32, f64, u8)>)>,
    exit_code: i32,
    echo_args: bool,
}

impl FakeSimulation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First output line is `args: <all arguments>`.
    #[must_use]
    pub fn echo_args(mut self) -> Self {
        self.echo_args = true;
        self
    }

    #[must_use]
    pub fn with_line(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    /// One `Progress: NN.NN%` line per value.
    #[must_use]
    pub fn with_progress(mut self, percents: &[f64]) -> Self {
        for percent in percents {
            self.lines.push(format!("Progress: {percent:.2}%"));
        }
        self
    }

    #[must_use]
    pub fn with_stderr(mut self, text: &str) -> Self {
        self.stderr = Some(text.to_string());
        self
    }

    /// Write `name` into the working directory with these rows.
    #[must_use]
    pub fn with_results_csv(mut self, name: &str, rows: &[(u32, f64, u8)]) -> Self {
        self.results = Some((name.to_string(), rows.to_vec()));
        self
    }

    #[must_use]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Render the script text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut script = String::from("#!/bin/sh\n");
        if self.echo_args {
            script.push_str("echo \"args: $*\"\n");
        }
        for line in &self.lines {
            let _ = writeln!(script, "printf '%s\\n' {}", quote(line));
        }
        if let Some((name, rows)) = &self.results {
            let mut csv = String::from("Iteration,Percentages,Decision\n");
            for (iteration, percentage, decision) in rows {
                let _ = writeln!(csv, "{iteration},{percentage},{decision}");
            }
            let _ = writeln!(script, "printf '%s' {} > {}", quote(&csv), quote(name));
        }
        if let Some(text) = &self.stderr {
            let _ = writeln!(script, "printf '%s' {} >&2", quote(text));
        }
        let _ = writeln!(script, "exit {}", self.exit_code);
        script
    }

    /// Write the script as `dir/name` and return its path.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        write_script(dir, name, &self.render())
    }
}

/// Single-quote `text` for the shell.
fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_progress_and_exit_code() {
        let script = FakeSimulation::new()
            .with_progress(&[12.5])
            .with_exit_code(2)
            .render();
        assert!(script.contains("printf '%s\\n' 'Progress: 12.50%'"));
        assert!(script.ends_with("exit 2\n"));
    }

    #[test]
    fn quotes_single_quotes() {
        assert_eq!(quote("it's"), "'it'\\''s'");
    }
}
