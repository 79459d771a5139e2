use crate::model::SimulationVariant;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Version of the launcher configuration format.
pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_INTERPRETER: &str = "python3";

/// How simulations are located and started.
///
/// Every field has a default, so an empty file (or no file at all) yields a
/// working configuration that runs `python3 -u <script>` from the current
/// directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LauncherConfig {
    pub config_version: u32,
    /// Interpreter that runs the scripts; `None` executes scripts directly.
    pub interpreter: Option<String>,
    /// Arguments placed between the interpreter and the script path.
    pub interpreter_args: Vec<String>,
    /// Directory holding the simulation scripts.
    pub scripts_dir: Option<PathBuf>,
    pub scripts: ScriptTable,
    /// Working directory of the child; also where result files are searched.
    pub working_dir: Option<PathBuf>,
    pub env: EnvOverrides,
    /// Alternative progress regex with exactly one capture group.
    pub progress_pattern: Option<String>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            interpreter: Some(DEFAULT_INTERPRETER.to_string()),
            interpreter_args: vec!["-u".to_string()],
            scripts_dir: None,
            scripts: ScriptTable::default(),
            working_dir: None,
            env: EnvOverrides::default(),
            progress_pattern: None,
        }
    }
}

impl LauncherConfig {
    #[must_use]
    pub fn script_path(&self, variant: SimulationVariant) -> PathBuf {
        let name = self.scripts.for_variant(variant);
        match &self.scripts_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Directory scanned for result files after an iterative run.
    #[must_use]
    pub fn results_dir(&self) -> &Path {
        self.working_dir.as_deref().unwrap_or_else(|| Path::new("."))
    }
}

/// Script file names per variant, relative to `scripts_dir`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptTable {
    pub basic: String,
    pub ideal_attack: String,
    pub damping_noise: String,
    pub flip_noise: String,
}

impl Default for ScriptTable {
    fn default() -> Self {
        Self {
            basic: SimulationVariant::Basic.default_script().to_string(),
            ideal_attack: SimulationVariant::IdealAttack.default_script().to_string(),
            damping_noise: SimulationVariant::DampingNoise.default_script().to_string(),
            flip_noise: SimulationVariant::FlipNoise.default_script().to_string(),
        }
    }
}

impl ScriptTable {
    #[must_use]
    pub fn for_variant(&self, variant: SimulationVariant) -> &str {
        match variant {
            SimulationVariant::Basic => &self.basic,
            SimulationVariant::IdealAttack => &self.ideal_attack,
            SimulationVariant::DampingNoise => &self.damping_noise,
            SimulationVariant::FlipNoise => &self.flip_noise,
        }
    }
}

/// Environment variables set on the child in addition to the inherited ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvOverrides {
    pub set: BTreeMap<String, String>,
}
