//! Common test helper functions.
//!
//! These utilities reduce boilerplate in integration tests: scratch
//! directories, executable scripts, sample result files and launcher
//! configuration files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Create a unique temporary directory for a test.
///
/// The name combines the prefix, a timestamp, the process id and a counter
/// so parallel tests never collide.
///
/// # Panics
///
/// Panics if the directory cannot be created.
///
/// # Example
///
/// ```ignore
/// let dir = temp_dir("discovery");
/// // dir is something like /tmp/qzkp-discovery-1703520000000-4242-0
/// ```
#[must_use]
pub fn temp_dir(prefix: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "qzkp-{prefix}-{stamp}-{}-{seq}",
        std::process::id()
    ));

    #[allow(clippy::expect_used)]
    fs::create_dir_all(&dir).expect("failed to create temp directory");

    dir
}

/// Write `body` to `dir/name` and mark it executable.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);

    #[allow(clippy::expect_used)]
    fs::write(&path, body).expect("failed to write script");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        #[allow(clippy::expect_used)]
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("failed to mark script executable");
    }
    path
}

/// Write a result CSV with the given `(iteration, percentage, decision)` rows.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_results_csv(path: &Path, rows: &[(u32, f64, u8)]) {
    let mut data = String::from("Iteration,Percentages,Decision\n");
    for (iteration, percentage, decision) in rows {
        data.push_str(&format!("{iteration},{percentage},{decision}\n"));
    }

    #[allow(clippy::expect_used)]
    fs::write(path, data).expect("failed to write results csv");
}

/// Write a launcher configuration as JSON.
///
/// # Panics
///
/// Panics if serialization or file writing fails.
///
/// # Example
///
/// ```ignore
/// write_config(&dir.join("qzkp.json"), &serde_json::json!({"interpreter": "sh"}));
/// ```
pub fn write_config(path: &Path, config: &serde_json::Value) {
    #[allow(clippy::expect_used)]
    let data = serde_json::to_vec_pretty(config).expect("failed to serialize config");

    #[allow(clippy::expect_used)]
    fs::write(path, data).expect("failed to write config file");
}

/// Path of a binary built from this crate, next to the binary under test.
///
/// `anchor` is a binary path from `env!("CARGO_BIN_EXE_...")`.
#[must_use]
pub fn sibling_binary(anchor: &Path, name: &str) -> PathBuf {
    let file = if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    };
    anchor
        .parent()
        .map_or_else(|| PathBuf::from(&file), |dir| dir.join(&file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_creates_unique_directories() {
        let dir1 = temp_dir("test1");
        let dir2 = temp_dir("test1");

        assert!(dir1.exists());
        assert!(dir2.exists());
        assert_ne!(dir1, dir2);

        // Cleanup
        let _ = fs::remove_dir_all(&dir1);
        let _ = fs::remove_dir_all(&dir2);
    }

    #[test]
    fn temp_dir_includes_prefix() {
        let dir = temp_dir("myprefix");
        let name = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        assert!(name.starts_with("qzkp-myprefix-"));

        // Cleanup
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn results_csv_has_header_and_rows() {
        let dir = temp_dir("csv");
        let path = dir.join("r.csv");
        write_results_csv(&path, &[(1, 50.5, 0), (2, 12.0, 1)]);
        let text = fs::read_to_string(&path).unwrap_or_default();
        assert_eq!(text, "Iteration,Percentages,Decision\n1,50.5,0\n2,12,1\n");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn sibling_binary_shares_directory() {
        let path = sibling_binary(Path::new("/target/debug/qzkp"), "qzkp-fake-sim");
        assert_eq!(path.parent(), Some(Path::new("/target/debug")));
    }
}
