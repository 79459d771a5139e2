//! Console observer for `qzkp run`, with an optional indicatif progress bar.

use indicatif::{ProgressBar, ProgressStyle};
use qzkp_launcher::progress::ProgressEvent;
use qzkp_launcher::session::SessionObserver;
use qzkp_launcher::RunResult;
use std::io::Write;
use std::time::Duration;

const BAR_TEMPLATE: &str = "{spinner:.cyan} [{elapsed_precise}] {bar:30.cyan/blue} {pos:>3}% {msg}";

/// Streams child output line by line.
///
/// Output goes to stdout, or to stderr when stdout is reserved for the JSON
/// result. With `verbose`, status changes are echoed and iterative runs get
/// a progress bar on stderr.
pub struct ConsoleObserver {
    json: bool,
    verbose: bool,
    bar: Option<ProgressBar>,
}

impl ConsoleObserver {
    pub fn new(json: bool, verbose: bool) -> Self {
        Self {
            json,
            verbose,
            bar: None,
        }
    }

    fn emit(&self, line: &str, to_stderr: bool) {
        let write = || {
            if to_stderr {
                let _ = writeln!(std::io::stderr(), "{line}");
            } else {
                let _ = writeln!(std::io::stdout(), "{line}");
            }
        };
        match &self.bar {
            Some(bar) => bar.suspend(write),
            None => write(),
        }
    }

    fn bar(&mut self) -> &ProgressBar {
        self.bar.get_or_insert_with(|| {
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        })
    }
}

impl SessionObserver for ConsoleObserver {
    fn on_output(&mut self, line: &str) {
        self.emit(line, self.json);
    }

    fn on_progress(&mut self, event: &ProgressEvent) {
        if !self.verbose {
            return;
        }
        let bar = self.bar();
        bar.set_position(u64::from(event.whole_percent()));
        bar.set_message(event.label().to_string());
    }

    fn on_status(&mut self, status: &str) {
        tracing::debug!(status, "session status");
        if self.verbose {
            self.emit(&format!("status: {status}"), true);
        }
    }

    fn on_finished(&mut self, result: &RunResult) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        if self.verbose {
            self.emit(&result.total_time_label(), true);
        }
    }
}
