//! Test utilities and fixtures for qzkp-launcher integration tests.
//!
//! - [`FakeSimulation`] - Fluent API for shell scripts that mimic a simulation
//! - [`temp_dir`] - Create unique temporary directories
//! - [`write_script`] / [`write_results_csv`] / [`write_config`] - Write fixture files
//! - the `qzkp-fake-sim` binary - an executable stand-in for the iterative
//!   simulations, locate it with [`sibling_binary`]
//!
//! # Example
//!
//! ```ignore
//! use qzkp_launcher_fixtures::{temp_dir, write_config, FakeSimulation};
//!
//! let dir = temp_dir("my-test");
//! FakeSimulation::new()
//!     .echo_args()
//!     .with_progress(&[50.0, 100.0])
//!     .write(&dir, "QZKP_barebones.py");
//! write_config(
//!     &dir.join("qzkp.json"),
//!     &serde_json::json!({ "interpreter": "sh", "interpreter_args": [], "scripts_dir": dir }),
//! );
//! ```

// Test fixtures crate - relaxed lints for test utilities
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod builders;
pub mod helpers;

pub use builders::FakeSimulation;
pub use helpers::{sibling_binary, temp_dir, write_config, write_results_csv, write_script};
