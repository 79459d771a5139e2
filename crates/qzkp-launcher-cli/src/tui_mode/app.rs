//! Presenter state for the interactive front-end.
//!
//! [`App`] owns the session, the editable form and the widget state. Key
//! handling lives here so it can be tested without a terminal.

use crossterm::event::{KeyCode, KeyEvent};
use qzkp_launcher::export::{export_data, save_log, DataFormat};
use qzkp_launcher::progress::ProgressEvent;
use qzkp_launcher::results::{ResultPlot, ResultTable};
use qzkp_launcher::runner::{ErrorCode, RunnerResult};
use qzkp_launcher::session::{SessionObserver, SimulationSession, STATUS_READY};
use qzkp_launcher::{LauncherConfig, NoiseInput, ParameterForm, RunResult, SimulationVariant};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_CONSOLE_LINES: usize = 5000;
const DEFAULT_LOG_NAME: &str = "console_log.txt";
const DEFAULT_DATA_STEM: &str = "results";

/// Focusable rows of the parameter panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Variant,
    KeyLength,
    Iterations,
    NoiseA,
    NoiseB,
    Attacker,
    Format,
}

impl Field {
    /// Rows shown for `variant`, top to bottom.
    pub fn visible(variant: SimulationVariant) -> &'static [Self] {
        if variant.noise().is_some() {
            &[
                Self::Variant,
                Self::KeyLength,
                Self::Iterations,
                Self::NoiseA,
                Self::NoiseB,
                Self::Attacker,
                Self::Format,
            ]
        } else if variant.is_iterative() {
            &[Self::Variant, Self::KeyLength, Self::Iterations, Self::Format]
        } else {
            &[Self::Variant, Self::KeyLength, Self::Format]
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveTarget {
    Data,
    Log,
}

/// Path entry shown over the main screen while saving.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavePrompt {
    pub target: SaveTarget,
    pub input: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

/// Everything the session reports, as the widgets display it.
#[derive(Debug)]
pub struct UiState {
    pub console: Vec<String>,
    /// Lines scrolled up from the bottom of the console.
    pub scroll: usize,
    pub progress: ProgressEvent,
    pub status: String,
    /// Shown in place of the live elapsed time once a run has finished.
    pub total_time: Option<String>,
    pub plot: Option<ResultPlot>,
    /// Result file behind the chart; the source for "save data".
    pub data_file: Option<PathBuf>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            console: Vec::new(),
            scroll: 0,
            progress: ProgressEvent::new(0.0),
            status: STATUS_READY.to_string(),
            total_time: None,
            plot: None,
            data_file: None,
        }
    }
}

impl UiState {
    fn push_line(&mut self, line: &str) {
        self.console.extend(line.split('\n').map(str::to_string));
        let excess = self.console.len().saturating_sub(MAX_CONSOLE_LINES);
        if excess > 0 {
            self.console.drain(..excess);
        }
    }

    fn reset_for_run(&mut self) {
        self.console.clear();
        self.scroll = 0;
        self.progress = ProgressEvent::new(0.0);
        self.total_time = None;
    }

    fn load_plot(&mut self, path: &Path) {
        match ResultTable::load(path).and_then(|table| table.plot()) {
            Ok(plot) => {
                self.push_line(&format!("Plotting results from: {}", path.display()));
                self.plot = Some(plot);
                self.data_file = Some(path.to_path_buf());
            }
            Err(err) => {
                self.push_line(&format!("Error plotting results: {}", err.message));
            }
        }
    }
}

impl SessionObserver for UiState {
    fn on_output(&mut self, line: &str) {
        self.push_line(line);
    }

    fn on_progress(&mut self, event: &ProgressEvent) {
        self.progress = event.clone();
    }

    fn on_status(&mut self, status: &str) {
        self.status = status.to_string();
    }

    fn on_result_file(&mut self, path: Option<&Path>) {
        if let Some(path) = path {
            self.load_plot(path);
        }
    }

    fn on_finished(&mut self, result: &RunResult) {
        if result.variant.is_iterative() {
            self.total_time = Some(result.total_time_label());
        } else {
            self.progress = ProgressEvent::new(0.0);
        }
    }
}

pub struct App {
    pub session: SimulationSession,
    pub form: ParameterForm,
    pub focus: Field,
    pub format: DataFormat,
    pub ui: UiState,
    pub prompt: Option<SavePrompt>,
    confirm_quit: bool,
}

impl App {
    pub fn new(config: LauncherConfig) -> RunnerResult<Self> {
        Ok(Self {
            session: SimulationSession::new(config)?,
            form: ParameterForm::default(),
            focus: Field::Variant,
            format: DataFormat::default(),
            ui: UiState::default(),
            prompt: None,
            confirm_quit: false,
        })
    }

    /// Deliver pending session events to the widgets.
    pub fn pump(&mut self) {
        self.session.pump(&mut self.ui);
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// `"Elapsed: 3.2s"` while running, the total time afterwards.
    pub fn time_label(&self) -> Option<String> {
        self.session
            .elapsed()
            .map(elapsed_label)
            .or_else(|| self.ui.total_time.clone())
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Control {
        if self.prompt.is_some() {
            self.handle_prompt_key(key.code);
            return Control::Continue;
        }
        let quit_requested = matches!(key.code, KeyCode::Char('q') | KeyCode::Esc);
        if !quit_requested {
            self.confirm_quit = false;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return self.request_quit(),
            KeyCode::Tab | KeyCode::Down => self.move_focus(true),
            KeyCode::BackTab | KeyCode::Up => self.move_focus(false),
            KeyCode::Left => self.adjust(false),
            KeyCode::Right | KeyCode::Char(' ') => self.adjust(true),
            KeyCode::Char(ch) if ch.is_ascii_digit() || ch == '.' => self.type_char(ch),
            KeyCode::Backspace => self.backspace(),
            KeyCode::Enter => self.start_run(),
            KeyCode::Char('s') => self.open_prompt(SaveTarget::Data),
            KeyCode::Char('l') => self.open_prompt(SaveTarget::Log),
            KeyCode::PageUp => {
                let max = self.ui.console.len().saturating_sub(1);
                self.ui.scroll = self.ui.scroll.saturating_add(10).min(max);
            }
            KeyCode::PageDown => self.ui.scroll = self.ui.scroll.saturating_sub(10),
            _ => {}
        }
        Control::Continue
    }

    /// Quitting mid-run needs a second press; the child keeps running.
    fn request_quit(&mut self) -> Control {
        if self.is_running() && !self.confirm_quit {
            self.confirm_quit = true;
            self.ui.status =
                "A simulation is still running. Press q again to quit and leave it running."
                    .to_string();
            return Control::Continue;
        }
        Control::Quit
    }

    fn move_focus(&mut self, forward: bool) {
        let fields = Field::visible(self.form.variant);
        let current = fields.iter().position(|f| *f == self.focus).unwrap_or(0);
        let next = if forward {
            (current + 1) % fields.len()
        } else {
            (current + fields.len() - 1) % fields.len()
        };
        if let Some(field) = fields.get(next) {
            self.focus = *field;
        }
    }

    fn adjust(&mut self, up: bool) {
        if self.is_running() {
            return;
        }
        match self.focus {
            Field::Variant => {
                let variant = if up {
                    self.form.variant.next()
                } else {
                    self.form.variant.previous()
                };
                self.select_variant(variant);
            }
            Field::NoiseA | Field::NoiseB => {
                let Some(noise) = self.form.variant.noise() else {
                    return;
                };
                let input = self.noise_input_mut();
                *input = input.step(up, noise.max_ticks);
            }
            Field::Attacker => self.form.attacker = !self.form.attacker,
            Field::Format => self.format = self.format.toggle(),
            Field::KeyLength | Field::Iterations => {}
        }
    }

    /// Noise inputs go back to their defaults because the slider range
    /// differs between noise models.
    fn select_variant(&mut self, variant: SimulationVariant) {
        let defaults = ParameterForm::new(variant);
        self.form.variant = variant;
        self.form.noise_a = defaults.noise_a;
        self.form.noise_b = defaults.noise_b;
    }

    fn noise_input_mut(&mut self) -> &mut NoiseInput {
        if self.focus == Field::NoiseB {
            &mut self.form.noise_b
        } else {
            &mut self.form.noise_a
        }
    }

    fn type_char(&mut self, ch: char) {
        if self.is_running() {
            return;
        }
        match self.focus {
            Field::KeyLength if ch != '.' => self.form.key_length.push(ch),
            Field::Iterations if ch != '.' => self.form.iterations.push(ch),
            Field::NoiseA | Field::NoiseB => {
                let input = self.noise_input_mut();
                let mut text = match input {
                    NoiseInput::Text(text) => std::mem::take(text),
                    NoiseInput::Slider(_) => String::new(),
                };
                text.push(ch);
                *input = NoiseInput::Text(text);
            }
            _ => {}
        }
    }

    fn backspace(&mut self) {
        if self.is_running() {
            return;
        }
        match self.focus {
            Field::KeyLength => {
                self.form.key_length.pop();
            }
            Field::Iterations => {
                self.form.iterations.pop();
            }
            Field::NoiseA | Field::NoiseB => {
                let input = self.noise_input_mut();
                let mut text = input.display();
                text.pop();
                *input = NoiseInput::Text(text);
            }
            _ => {}
        }
    }

    /// Run control is ignored while a simulation is active.
    pub fn start_run(&mut self) {
        if self.is_running() {
            return;
        }
        match self.session.start(&self.form) {
            Ok(_) => self.ui.reset_for_run(),
            Err(err) if err.code == ErrorCode::Parameter => {
                self.ui.status = format!("Parameter error: {}", err.message);
            }
            Err(err) => self.ui.status = err.to_string(),
        }
    }

    fn open_prompt(&mut self, target: SaveTarget) {
        let input = match target {
            SaveTarget::Data => format!("{DEFAULT_DATA_STEM}.{}", self.format.extension()),
            SaveTarget::Log => DEFAULT_LOG_NAME.to_string(),
        };
        self.prompt = Some(SavePrompt { target, input });
    }

    fn handle_prompt_key(&mut self, code: KeyCode) {
        let Some(prompt) = self.prompt.as_mut() else {
            return;
        };
        match code {
            KeyCode::Esc => self.prompt = None,
            KeyCode::Enter => {
                let target = prompt.target;
                let path = PathBuf::from(prompt.input.trim());
                self.prompt = None;
                if !path.as_os_str().is_empty() {
                    self.save(target, &path);
                }
            }
            KeyCode::Backspace => {
                prompt.input.pop();
            }
            KeyCode::Char(ch) => prompt.input.push(ch),
            _ => {}
        }
    }

    fn save(&mut self, target: SaveTarget, path: &Path) {
        self.ui.status = match target {
            SaveTarget::Data => self.save_data(path),
            SaveTarget::Log => match save_log(path, &self.ui.console.join("\n")) {
                Ok(()) => format!("Log saved to: {}", path.display()),
                Err(err) => format!("Error saving log: {}", err.message),
            },
        };
    }

    fn save_data(&self, path: &Path) -> String {
        let Some(source) = &self.ui.data_file else {
            return "No result data to save. Run an iterative simulation first.".to_string();
        };
        let dest = if DataFormat::from_path(path).is_some() {
            path.to_path_buf()
        } else {
            path.with_extension(self.format.extension())
        };
        match export_data(source, &dest, self.format) {
            Ok(()) => format!("Data saved to: {}", dest.display()),
            Err(err) => format!("Error saving data: {}", err.message),
        }
    }
}

pub fn elapsed_label(elapsed: Duration) -> String {
    format!("Elapsed: {:.1}s", elapsed.as_secs_f64())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn app() -> App {
        App::new(LauncherConfig::default()).unwrap_or_else(|err| panic!("{err}"))
    }

    fn press(app: &mut App, code: KeyCode) -> Control {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn focus_cycles_through_visible_fields() {
        let mut app = app();
        assert_eq!(app.focus, Field::Variant);
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus, Field::Format);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus, Field::Variant);
        press(&mut app, KeyCode::BackTab);
        assert_eq!(app.focus, Field::Format);
    }

    #[test]
    fn switching_variant_resets_noise_inputs() {
        let mut app = app();
        app.form.noise_a = NoiseInput::Slider(40);
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Right);
        assert_eq!(app.form.variant, SimulationVariant::DampingNoise);
        assert_eq!(app.form.noise_a, NoiseInput::Slider(1));
        assert_eq!(Field::visible(app.form.variant).len(), 7);
    }

    #[test]
    fn typing_edits_numeric_fields() {
        let mut app = app();
        app.focus = Field::KeyLength;
        press(&mut app, KeyCode::Backspace);
        press(&mut app, KeyCode::Backspace);
        press(&mut app, KeyCode::Char('1'));
        press(&mut app, KeyCode::Char('.'));
        press(&mut app, KeyCode::Char('6'));
        assert_eq!(app.form.key_length, "16");
    }

    #[test]
    fn typed_noise_replaces_slider_value() {
        let mut app = app();
        app.form.variant = SimulationVariant::FlipNoise;
        app.focus = Field::NoiseB;
        for ch in "0.05".chars() {
            press(&mut app, KeyCode::Char(ch));
        }
        assert_eq!(app.form.noise_b, NoiseInput::Text("0.05".to_string()));
        press(&mut app, KeyCode::Right);
        assert_eq!(app.form.noise_b, NoiseInput::Slider(6));
    }

    #[test]
    fn invalid_form_reports_parameter_error() {
        let mut app = app();
        app.form.key_length = "0".to_string();
        press(&mut app, KeyCode::Enter);
        assert!(app.ui.status.starts_with("Parameter error: "));
        assert!(!app.is_running());
    }

    #[test]
    fn save_data_without_results_is_reported() {
        let mut app = app();
        press(&mut app, KeyCode::Char('s'));
        assert_eq!(
            app.prompt.as_ref().map(|p| p.input.as_str()),
            Some("results.csv")
        );
        press(&mut app, KeyCode::Enter);
        assert!(app.prompt.is_none());
        assert!(app.ui.status.starts_with("No result data to save"));
    }

    #[test]
    fn format_field_cycles_to_excel_and_back() {
        let mut app = app();
        app.focus = Field::Format;
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Right);
        assert_eq!(app.format, DataFormat::Xlsx);
        press(&mut app, KeyCode::Char('s'));
        assert_eq!(
            app.prompt.as_ref().map(|p| p.input.as_str()),
            Some("results.xlsx")
        );
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Right);
        assert_eq!(app.format, DataFormat::Csv);
    }

    #[test]
    fn escape_closes_prompt_without_quitting() {
        let mut app = app();
        press(&mut app, KeyCode::Char('l'));
        assert_eq!(press(&mut app, KeyCode::Esc), Control::Continue);
        assert!(app.prompt.is_none());
        assert_eq!(press(&mut app, KeyCode::Char('q')), Control::Quit);
    }

    #[test]
    fn output_sections_are_split_into_lines() {
        let mut ui = UiState::default();
        ui.on_output("\n--- ERRORS ---\nboom");
        assert_eq!(ui.console, vec!["", "--- ERRORS ---", "boom"]);
        ui.on_progress(&ProgressEvent::new(42.5));
        assert_eq!(ui.progress.whole_percent(), 42);
    }

    #[test]
    fn elapsed_label_has_one_decimal() {
        assert_eq!(elapsed_label(Duration::from_millis(3240)), "Elapsed: 3.2s");
    }
}
