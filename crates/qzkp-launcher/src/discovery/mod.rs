//! Locating the result file an iterative simulation left behind.
//!
//! The simulations write a CSV into their working directory under a name of
//! their own choosing, so the newest `.csv` file there is taken as the result
//! of the run that just finished.

use crate::runner::{RunnerError, RunnerResult};
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const RESULT_EXTENSION: &str = "csv";

/// Regular `.csv` files directly inside `dir`, newest first.
pub fn list_results(dir: &Path) -> RunnerResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|err| {
        RunnerError::io(format!("failed to read directory {}", dir.display()), err)
    })?;
    let mut found = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|err| RunnerError::io("failed to read directory entry", err))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(RESULT_EXTENSION) {
            continue;
        }
        // Follows symlinks; dangling links are skipped.
        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        found.push((created_at(&metadata), path));
    }
    found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// The most recently created result file in `dir`, if any.
pub fn find_latest_result(dir: &Path) -> RunnerResult<Option<PathBuf>> {
    let latest = list_results(dir)?.into_iter().next();
    match &latest {
        Some(path) => tracing::info!(path = %path.display(), "found result file"),
        None => tracing::info!(dir = %dir.display(), "no result file found"),
    }
    Ok(latest)
}

/// Like [`find_latest_result`] but a missing file is an `E_RESULT_DISCOVERY` error.
pub fn require_latest_result(dir: &Path) -> RunnerResult<PathBuf> {
    find_latest_result(dir)?.ok_or_else(|| {
        RunnerError::result_discovery(
            "No results CSV file found.",
            serde_json::json!({ "dir": dir.display().to_string() }),
        )
    })
}

/// Creation time where the platform records it, else modification time.
fn created_at(metadata: &Metadata) -> SystemTime {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ErrorCode;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "qzkp-discovery-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        let _ = fs::create_dir_all(&dir);
        dir
    }

    #[test]
    fn empty_directory_has_no_result() {
        let dir = scratch("empty");
        assert_eq!(find_latest_result(&dir).ok(), Some(None));
        let code = require_latest_result(&dir).err().map(|err| err.code);
        assert_eq!(code, Some(ErrorCode::ResultDiscovery));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn ignores_other_extensions_and_directories() {
        let dir = scratch("filter");
        let _ = fs::write(dir.join("notes.txt"), "x");
        let _ = fs::write(dir.join("upper.CSV"), "x");
        let _ = fs::create_dir_all(dir.join("folder.csv"));
        let _ = fs::write(dir.join("run.csv"), "Iteration,Percentages\n");
        let found = list_results(&dir).ok();
        assert_eq!(found, Some(vec![dir.join("run.csv")]));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let code = list_results(Path::new("/nonexistent/qzkp/results"))
            .err()
            .map(|err| err.code);
        assert_eq!(code, Some(ErrorCode::Io));
    }
}
