//! qzkp-launcher: supervision of quantum zero-knowledge proof simulation scripts.
//!
//! The simulations are external scripts treated as black boxes. This crate
//! starts them with validated arguments, streams their console output line by
//! line, extracts the percentage progress they print, and afterwards locates,
//! loads and exports the CSV result files the iterative simulations write.
//!
//! The entry point for front-ends is [`session::SimulationSession`]; for a
//! one-shot blocking run use [`run::run_simulation`].

#![forbid(unsafe_code)]
// Public types are documented where the meaning is not obvious from the name.
#![allow(missing_docs)]

pub mod config;
pub mod discovery;
pub mod export;
pub mod model;
pub mod progress;
pub mod results;
pub mod runner;
pub mod session;

pub use crate::model::*;

pub mod run {
    use super::runner::RunnerResult;
    use super::session::{SessionObserver, SimulationSession};
    use super::{LauncherConfig, ParameterForm, RunResult};

    /// Start one simulation and block until it finishes.
    ///
    /// Launch and child failures are part of the returned [`RunResult`];
    /// only configuration and parameter problems are errors.
    pub fn run_simulation(
        config: LauncherConfig,
        form: &ParameterForm,
        observer: &mut dyn SessionObserver,
    ) -> RunnerResult<RunResult> {
        let mut session = SimulationSession::new(config)?;
        session.start(form)?;
        session.wait_finished(observer).ok_or_else(|| {
            crate::runner::RunnerError::io("simulation did not report a result", "no active run")
        })
    }
}
