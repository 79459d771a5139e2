//! Interactive TUI mode for launching simulations.
//!
//! Provides a live terminal UI showing:
//! - Variant selector and parameter fields with noise sliders
//! - Simulation console output
//! - Progress gauge with elapsed time
//! - Scatter chart of the latest result file
//!
//! Session events are pumped on the UI thread between key polls, so the
//! widgets only ever change here.

mod app;
mod ui;

use app::{App, Control};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use miette::{IntoDiagnostic, Result};
use qzkp_launcher::LauncherConfig;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run the interactive front-end until the user quits.
///
/// Quitting while a simulation is running leaves the child to finish on its
/// own.
pub fn run_tui(config: LauncherConfig) -> Result<()> {
    let mut app = App::new(config)?;

    // Set up terminal
    enable_raw_mode().into_diagnostic()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).into_diagnostic()?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).into_diagnostic()?;

    // Main UI loop
    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode().into_diagnostic()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).into_diagnostic()?;
    terminal.show_cursor().into_diagnostic()?;

    if app.is_running() {
        eprintln!("simulation still running; it will finish in the background");
    }
    result
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        app.pump();
        terminal.draw(|f| ui::draw(f, app)).into_diagnostic()?;

        if event::poll(POLL_INTERVAL).into_diagnostic()? {
            if let Event::Key(key) = event::read().into_diagnostic()? {
                if key.kind == KeyEventKind::Press && app.handle_key(key) == Control::Quit {
                    return Ok(());
                }
            }
        }
    }
}
