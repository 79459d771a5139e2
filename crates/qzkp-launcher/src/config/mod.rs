//! Loading and validating [`LauncherConfig`].

use crate::model::{LauncherConfig, CONFIG_VERSION};
use crate::progress::ProgressExtractor;
use crate::runner::{RunnerError, RunnerResult};
use std::fs;
use std::path::Path;

/// Loader-injection variables that the child must never receive through
/// configuration. Compared case-insensitively.
const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    "DYLD_FALLBACK_LIBRARY_PATH",
    "DYLD_ROOT_PATH",
];

fn is_dangerous_env_var(key: &str) -> bool {
    DANGEROUS_ENV_VARS
        .iter()
        .any(|var| var.eq_ignore_ascii_case(key))
}

/// Read a configuration file; `.yaml`/`.yml` are parsed as YAML, anything
/// else as JSON. The result is validated before it is returned.
pub fn load_config_file(path: &Path) -> RunnerResult<LauncherConfig> {
    let data = fs::read_to_string(path).map_err(|err| {
        RunnerError::config(
            format!("failed to read config file {}", path.display()),
            serde_json::json!({ "source": err.to_string() }),
        )
    })?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    let config: LauncherConfig = if is_yaml {
        serde_yml::from_str(&data).map_err(|err| parse_error(path, "yaml", &err))?
    } else {
        serde_json::from_str(&data).map_err(|err| parse_error(path, "json", &err))?
    };
    validate_config(&config)?;
    tracing::debug!(path = %path.display(), "loaded launcher config");
    Ok(config)
}

fn parse_error(path: &Path, format: &str, err: &dyn std::fmt::Display) -> RunnerError {
    RunnerError::config(
        format!("failed to parse {format} config {}", path.display()),
        serde_json::json!({ "source": err.to_string() }),
    )
}

/// Load `path` if given, otherwise return the defaults.
pub fn load_config(path: Option<&Path>) -> RunnerResult<LauncherConfig> {
    match path {
        Some(path) => load_config_file(path),
        None => Ok(LauncherConfig::default()),
    }
}

pub fn validate_config(config: &LauncherConfig) -> RunnerResult<()> {
    if config.config_version != CONFIG_VERSION {
        return Err(RunnerError::config(
            "unsupported config_version",
            serde_json::json!({
                "expected": CONFIG_VERSION,
                "actual": config.config_version,
            }),
        ));
    }
    if let Some(interpreter) = &config.interpreter {
        if interpreter.trim().is_empty() {
            return Err(RunnerError::config(
                "interpreter must not be empty; omit it to run scripts directly",
                None,
            ));
        }
    }
    for key in config.env.set.keys() {
        if key.is_empty() || key.contains('=') {
            return Err(RunnerError::config(
                "invalid environment variable name",
                serde_json::json!({ "name": key }),
            ));
        }
        if is_dangerous_env_var(key) {
            return Err(RunnerError::config(
                "environment override is not allowed",
                serde_json::json!({ "name": key }),
            ));
        }
    }
    if let Some(pattern) = &config.progress_pattern {
        ProgressExtractor::new(pattern)?;
    }
    Ok(())
}

/// Environment overrides in the order they are applied to the child.
#[must_use]
pub fn env_overrides(config: &LauncherConfig) -> Vec<(String, String)> {
    config
        .env
        .set
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
