//! qzkp: launcher for the QZKP simulation scripts.
//!
//! Command-line interface for running simulations, browsing their results
//! interactively and exporting result tables.

// CLI-specific lint allowances (CLI binary, not library)
#![allow(missing_docs)]
#![allow(clippy::print_stdout)] // CLI must print to stdout
#![allow(clippy::print_stderr)] // CLI must print to stderr
#![allow(clippy::exit)] // CLI uses exit codes

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use miette::{IntoDiagnostic, Result};
use qzkp_launcher::config::{load_config, validate_config};
use qzkp_launcher::discovery::require_latest_result;
use qzkp_launcher::export::{export_data, DataFormat};
use qzkp_launcher::run::run_simulation;
use qzkp_launcher::runner::{ErrorCode, RunnerError};
use qzkp_launcher::session::SimulationSession;
use qzkp_launcher::{
    ExitStatus, LauncherConfig, NoiseInput, ParameterForm, RunResult, RunStatus, SimulationVariant,
};
use std::io;
use std::path::{Path, PathBuf};

mod logging;
mod progress;
mod tui_mode;

use logging::LogLevel;

/// Color output mode
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum ColorMode {
    /// Auto-detect based on terminal and `NO_COLOR` env
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Debug, Parser)]
#[command(
    name = "qzkp",
    version,
    about = "Launch QZKP simulations and inspect their results"
)]
struct Cli {
    /// Control color output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    color: ColorMode,

    /// Log verbosity when `RUST_LOG` is not set
    #[arg(long, value_enum, default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one simulation and stream its output
    Run(RunArgs),
    /// Interactive terminal front-end
    Tui {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the most recent result CSV
    Latest {
        #[arg(long)]
        json: bool,
        /// Directory to scan (defaults to the configured working directory)
        #[arg(long)]
        dir: Option<PathBuf>,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Convert a result CSV to CSV or JSON
    Export {
        #[arg(long)]
        json: bool,
        /// Output format (inferred from the output extension when omitted)
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        #[arg(long, short = 'o')]
        output: PathBuf,
        /// Result CSV to export (defaults to the most recent one)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Directory to scan when `--input` is not given
        #[arg(long)]
        dir: Option<PathBuf>,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the effective configuration
    ShowConfig {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, value_enum, default_value = "basic")]
    variant: VariantArg,
    #[arg(long, help = "Key length (positive integer, default 64)")]
    key_length: Option<String>,
    #[arg(long, help = "Number of iterations (iterative variants, default 200)")]
    iterations: Option<String>,
    #[arg(long, help = "First noise probability (damping and flip variants)")]
    noise_a: Option<String>,
    #[arg(long, help = "Second noise probability (damping and flip variants)")]
    noise_b: Option<String>,
    #[arg(long, help = "Simulate without the attacker (damping and flip variants)")]
    no_attacker: bool,
    #[arg(long)]
    json: bool,
    #[arg(long, short = 'v', help = "Show status and a progress bar on stderr")]
    verbose: bool,
    #[arg(long, help = "Print the command that would run and exit")]
    dry_run: bool,
    #[command(flatten)]
    config: ConfigArgs,
}

/// Configuration file plus per-invocation overrides.
#[derive(Debug, Args)]
struct ConfigArgs {
    /// Launcher configuration file (JSON, or YAML for .yaml/.yml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Interpreter for the scripts (replaces the configured arguments)
    #[arg(long, conflicts_with = "no_interpreter")]
    interpreter: Option<String>,
    /// Argument placed before the script path; repeatable
    #[arg(long = "interpreter-arg", allow_hyphen_values = true)]
    interpreter_args: Vec<String>,
    /// Execute the scripts directly
    #[arg(long)]
    no_interpreter: bool,
    #[arg(long)]
    scripts_dir: Option<PathBuf>,
    /// Working directory of the child and default results directory
    #[arg(long)]
    working_dir: Option<PathBuf>,
}

impl ConfigArgs {
    fn load(&self) -> std::result::Result<LauncherConfig, RunnerError> {
        let mut config = load_config(self.config.as_deref())?;
        if self.no_interpreter {
            config.interpreter = None;
            config.interpreter_args.clear();
        }
        if let Some(interpreter) = &self.interpreter {
            config.interpreter = Some(interpreter.clone());
            config.interpreter_args.clear();
        }
        if !self.interpreter_args.is_empty() {
            config.interpreter_args.clone_from(&self.interpreter_args);
        }
        if let Some(dir) = &self.scripts_dir {
            config.scripts_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.working_dir {
            config.working_dir = Some(dir.clone());
        }
        validate_config(&config)?;
        Ok(config)
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum VariantArg {
    Basic,
    IdealAttack,
    Damping,
    Flip,
}

impl From<VariantArg> for SimulationVariant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Basic => Self::Basic,
            VariantArg::IdealAttack => Self::IdealAttack,
            VariantArg::Damping => Self::DampingNoise,
            VariantArg::Flip => Self::FlipNoise,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatArg {
    Csv,
    Json,
    Xlsx,
}

impl From<FormatArg> for DataFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => Self::Csv,
            FormatArg::Json => Self::Json,
            FormatArg::Xlsx => Self::Xlsx,
        }
    }
}

/// Configure color output based on CLI flag and environment
fn configure_colors(mode: ColorMode) -> bool {
    let use_color = match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            // Respect NO_COLOR environment variable
            if std::env::var("NO_COLOR").is_ok() {
                false
            } else {
                // Check if stderr supports color (where we output diagnostics)
                supports_color::on(supports_color::Stream::Stderr).is_some()
            }
        }
    };

    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .color(use_color)
                .unicode(use_color)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set

    use_color
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let use_color = configure_colors(cli.color);
    // The TUI owns the terminal; log lines would corrupt the screen.
    if !matches!(cli.command, Commands::Tui { .. }) {
        logging::init_tracing(cli.log_level, use_color);
    }
    match cli.command {
        Commands::Run(args) => cmd_run(&args),
        Commands::Tui { config } => cmd_tui(&config),
        Commands::Latest { json, dir, config } => cmd_latest(json, dir, &config),
        Commands::Export {
            json,
            format,
            output,
            input,
            dir,
            config,
        } => cmd_export(json, format, &output, input, dir, &config),
        Commands::ShowConfig { config } => cmd_show_config(&config),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

// =============================================================================
// Command Handlers
// =============================================================================

/// Handle the run command.
fn cmd_run(args: &RunArgs) -> Result<()> {
    let json = args.json;
    let config = match args.config.load() {
        Ok(config) => config,
        Err(err) => return emit_error(json, err),
    };
    let form = match build_form(args) {
        Ok(form) => form,
        Err(err) => return emit_error(json, err),
    };
    if args.dry_run {
        return cmd_dry_run(json, config, &form);
    }
    let mut observer = progress::ConsoleObserver::new(json, args.verbose);
    emit_result(json, run_simulation(config, &form, &mut observer))
}

fn build_form(args: &RunArgs) -> std::result::Result<ParameterForm, RunnerError> {
    let variant = SimulationVariant::from(args.variant);
    if variant.noise().is_none() {
        if args.noise_a.is_some() || args.noise_b.is_some() {
            return Err(RunnerError::cli_invalid_arg(
                "--noise-a and --noise-b apply only to the damping and flip variants",
            ));
        }
        if args.no_attacker {
            return Err(RunnerError::cli_invalid_arg(
                "--no-attacker applies only to the damping and flip variants",
            ));
        }
    }
    if !variant.is_iterative() && args.iterations.is_some() {
        return Err(RunnerError::cli_invalid_arg(
            "--iterations applies only to the iterative variants",
        ));
    }

    let mut form = ParameterForm::new(variant);
    if let Some(key_length) = &args.key_length {
        form.key_length.clone_from(key_length);
    }
    if let Some(iterations) = &args.iterations {
        form.iterations.clone_from(iterations);
    }
    if let Some(value) = &args.noise_a {
        form.noise_a = NoiseInput::Text(value.clone());
    }
    if let Some(value) = &args.noise_b {
        form.noise_b = NoiseInput::Text(value.clone());
    }
    form.attacker = !args.no_attacker;
    Ok(form)
}

/// Print the command a run would execute without starting it.
fn cmd_dry_run(json: bool, config: LauncherConfig, form: &ParameterForm) -> Result<()> {
    let params = match form.validate() {
        Ok(params) => params,
        Err(err) => return emit_error(json, err),
    };
    let session = match SimulationSession::new(config) {
        Ok(session) => session,
        Err(err) => return emit_error(json, err),
    };
    let spec = session.build_launch_spec(&params);
    if json {
        let payload = serde_json::json!({
            "program": spec.program,
            "args": spec.args,
            "cwd": spec.cwd,
            "env": spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string(&payload).into_diagnostic()?);
    } else {
        println!("{}", spec.command_line());
    }
    Ok(())
}

fn cmd_tui(config: &ConfigArgs) -> Result<()> {
    match config.load() {
        Ok(config) => tui_mode::run_tui(config),
        Err(err) => emit_error(false, err),
    }
}

/// Handle the latest command.
fn cmd_latest(json: bool, dir: Option<PathBuf>, config: &ConfigArgs) -> Result<()> {
    let dir = match results_dir(dir, config) {
        Ok(dir) => dir,
        Err(err) => return emit_error(json, err),
    };
    match require_latest_result(&dir) {
        Ok(path) => {
            if json {
                let payload = serde_json::json!({ "path": path });
                println!("{}", serde_json::to_string(&payload).into_diagnostic()?);
            } else {
                println!("{}", path.display());
            }
            Ok(())
        }
        Err(err) => emit_error(json, err),
    }
}

/// Handle the export command.
fn cmd_export(
    json: bool,
    format: Option<FormatArg>,
    output: &Path,
    input: Option<PathBuf>,
    dir: Option<PathBuf>,
    config: &ConfigArgs,
) -> Result<()> {
    let Some(format) = format
        .map(DataFormat::from)
        .or_else(|| DataFormat::from_path(output))
    else {
        return emit_cli_error(
            json,
            "cannot infer the export format from the output file name; pass --format",
        );
    };
    let source = match input {
        Some(path) => path,
        None => match results_dir(dir, config).and_then(|dir| require_latest_result(&dir)) {
            Ok(path) => path,
            Err(err) => return emit_error(json, err),
        },
    };
    if let Err(err) = export_data(&source, output, format) {
        return emit_error(json, err);
    }
    if json {
        let payload = serde_json::json!({
            "source": source,
            "output": output,
            "format": format.extension(),
        });
        println!("{}", serde_json::to_string(&payload).into_diagnostic()?);
    } else {
        println!("Data saved to: {}", output.display());
    }
    Ok(())
}

fn results_dir(
    dir: Option<PathBuf>,
    config: &ConfigArgs,
) -> std::result::Result<PathBuf, RunnerError> {
    match dir {
        Some(dir) => Ok(dir),
        None => config.load().map(|config| config.results_dir().to_path_buf()),
    }
}

/// Handle the show-config command.
fn cmd_show_config(config: &ConfigArgs) -> Result<()> {
    let config = match config.load() {
        Ok(config) => config,
        Err(err) => return emit_error(false, err),
    };
    println!("{}", serde_json::to_string_pretty(&config).into_diagnostic()?);
    Ok(())
}

/// Handle the completions command.
fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

fn emit_result(json: bool, result: std::result::Result<RunResult, RunnerError>) -> Result<()> {
    match result {
        Ok(run_result) => {
            if json {
                let payload = serde_json::to_string(&run_result).into_diagnostic()?;
                println!("{payload}");
            } else {
                eprintln!("{}", describe_run(&run_result));
            }
            match exit_code_for_run(&run_result) {
                0 => Ok(()),
                code => std::process::exit(code),
            }
        }
        Err(err) => emit_error(json, err),
    }
}

fn emit_error(json: bool, err: RunnerError) -> Result<()> {
    let code = exit_code_for_error(&err);
    if json {
        let payload = serde_json::to_string(&err.to_error_info()).into_diagnostic()?;
        println!("{payload}");
    } else {
        eprintln!("{:?}", miette::Report::new(err));
    }
    std::process::exit(code);
}

fn emit_cli_error(json: bool, message: &str) -> Result<()> {
    emit_error(json, RunnerError::cli_invalid_arg(message))
}

/// One-line summary printed after a non-JSON run.
fn describe_run(run: &RunResult) -> String {
    let outcome = match run.status {
        RunStatus::Succeeded => "finished".to_string(),
        RunStatus::ChildFailed => format!(
            "failed with {}",
            run.exit_status
                .as_ref()
                .map_or_else(|| "unknown status".to_string(), ExitStatus::describe)
        ),
        RunStatus::LaunchFailed => "could not be started".to_string(),
    };
    let mut summary = format!(
        "{}: {outcome} ({})",
        run.variant.label(),
        run.total_time_label()
    );
    if let Some(path) = &run.result_file {
        summary.push_str(&format!("\nresults: {}", path.display()));
    }
    summary
}

fn exit_code_for_run(run: &RunResult) -> i32 {
    match run.status {
        RunStatus::Succeeded => 0,
        RunStatus::ChildFailed => ErrorCode::ChildFailure.exit_code(),
        RunStatus::LaunchFailed => run
            .error
            .as_ref()
            .and_then(|err| ErrorCode::parse(&err.code))
            .unwrap_or(ErrorCode::Launch)
            .exit_code(),
    }
}

fn exit_code_for_error(err: &RunnerError) -> i32 {
    err.exit_code()
}
