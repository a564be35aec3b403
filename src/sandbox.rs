// src/sandbox.rs
//! Runs a generated test module against a copy of the source file inside a
//! throwaway directory. Caller files are only ever read.
//!
//! Layout of the scratch directory:
//!
//! ```text
//! <tmp>/under_test.py
//! <tmp>/tests/conftest.py
//! <tmp>/tests/<test file name>
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Instant, SystemTime};
use tempfile::TempDir;
use tokio::process::Command;

use crate::config::RunnerConfig;
use crate::errors::{GenError, Result};
use crate::extract::SOURCE_MODULE;

/// Makes `under_test.py` in the parent directory importable from the tests directory.
pub const SANDBOX_CONFTEST: &str = "import sys, pathlib\n\
ROOT = pathlib.Path(__file__).resolve().parents[1]\n\
sys.path.insert(0, str(ROOT))\n";

/// Outcome of one test-runner invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub combined_output: String,
}

impl ExecutionResult {
    fn new(exit_code: i32, stdout: String, stderr: String) -> Self {
        let combined_output = format!("{}{}", stdout, stderr);
        Self { exit_code, stdout, stderr, combined_output }
    }

    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Most recently modified `test_*.py` directly inside `dir`.
pub fn latest_generated_test(dir: &Path) -> Result<PathBuf> {
    let not_found = || GenError::NotFound(format!("No generated test files found in {}", dir.display()));

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        // Follows symlinks, so a linked test module still counts.
        if !is_test_module(&path) || !path.is_file() {
            continue;
        }
        let modified = std::fs::metadata(&path)?.modified()?;
        if newest.as_ref().is_none_or(|(best, _)| modified > *best) {
            newest = Some((modified, path));
        }
    }

    newest.map(|(_, path)| path).ok_or_else(not_found)
}

/// Whether `path` names a `test_*.py` file.
pub fn is_test_module(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with("test_") && name.ends_with(".py"))
}

/// Copies the source and test file into a scratch directory and runs the
/// configured test command there, bounded by the runner timeout.
///
/// When `tests_path` is `None` the newest module in `generated_dir` is used.
/// Lookup failures are reported before any scratch directory is created.
pub async fn run_tests(
    runner: &RunnerConfig,
    code_path: &Path,
    tests_path: Option<&Path>,
    generated_dir: &Path,
) -> Result<ExecutionResult> {
    let tests_path = match tests_path {
        Some(path) if path.is_file() => path.to_path_buf(),
        Some(path) => {
            return Err(GenError::NotFound(format!("Test file {} does not exist", path.display())));
        }
        None => latest_generated_test(generated_dir)?,
    };
    if !code_path.is_file() {
        return Err(GenError::NotFound(format!("Source file {} does not exist", code_path.display())));
    }
    let test_file_name = tests_path
        .file_name()
        .ok_or_else(|| GenError::NotFound(format!("Test path {} has no file name", tests_path.display())))?;

    let (program, args) = runner
        .command
        .split_first()
        .ok_or_else(|| GenError::Config("Runner command is empty".to_string()))?;

    // Removed on drop, whichever way this function returns.
    let scratch = TempDir::new()?;
    let root = scratch.path();
    let tests_dir = root.join("tests");

    std::fs::copy(code_path, root.join(format!("{}.py", SOURCE_MODULE)))?;
    std::fs::create_dir_all(&tests_dir)?;
    std::fs::copy(&tests_path, tests_dir.join(test_file_name))?;
    std::fs::write(tests_dir.join("conftest.py"), SANDBOX_CONFTEST)?;

    log::info!(
        "🧪 Running {} in {} (timeout {}s)",
        tests_path.display(),
        root.display(),
        runner.timeout.as_secs_f64()
    );

    let mut cmd = Command::new(program);
    cmd.args(args)
        .arg("tests")
        .current_dir(root)
        .env("PYTHONPATH", root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started = Instant::now();
    let child = cmd.spawn()?;

    match tokio::time::timeout(runner.timeout, child.wait_with_output()).await {
        Ok(output) => {
            let output = output?;
            let result = ExecutionResult::new(
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stdout).into_owned(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
            );
            log::info!(
                "✅ Test run finished with exit code {} ({}ms)",
                result.exit_code,
                started.elapsed().as_millis()
            );
            Ok(result)
        }
        Err(_) => {
            log::warn!("⏱️  Test run exceeded {}s and was killed", runner.timeout.as_secs_f64());
            Err(GenError::Timeout { secs: runner.timeout.as_secs_f64() })
        }
    }
}

/// Last `max_chars` characters of `text`.
pub fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    #[test]
    fn test_is_test_module() {
        assert!(is_test_module(Path::new("tests/generated/test_power.py")));
        assert!(!is_test_module(Path::new("tests/conftest.py")));
        assert!(!is_test_module(Path::new("tests/test_power.pyc")));
    }

    #[test]
    fn test_latest_generated_test_picks_newest() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("test_old.py");
        let newer = dir.path().join("test_new.py");
        fs::write(&older, "").unwrap();
        fs::write(dir.path().join("helper.py"), "").unwrap();
        fs::write(&newer, "").unwrap();

        let past = SystemTime::now() - Duration::from_secs(3600);
        fs::File::options().write(true).open(&older).unwrap().set_modified(past).unwrap();

        assert_eq!(latest_generated_test(dir.path()).unwrap(), newer);
    }

    #[cfg(unix)]
    #[test]
    fn test_latest_generated_test_follows_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("power_tests.txt");
        fs::write(&target, "def test_power():\n    assert True\n").unwrap();
        let linked = dir.path().join("test_power.py");
        std::os::unix::fs::symlink(&target, &linked).unwrap();

        assert_eq!(latest_generated_test(dir.path()).unwrap(), linked);
    }

    #[test]
    fn test_latest_generated_test_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = latest_generated_test(&dir.path().join("generated")).unwrap_err();
        assert!(matches!(err, GenError::NotFound(_)));
    }

    #[test]
    fn test_tail_counts_chars() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 10), "ab");
        assert_eq!(tail("ééé", 2), "éé");
    }

    #[actix_rt::test]
    async fn test_run_without_tests_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let code = dir.path().join("under_test.py");
        fs::write(&code, "def f():\n    return 1\n").unwrap();

        let err = run_tests(&RunnerConfig::default(), &code, None, &dir.path().join("tests/generated"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::NotFound(_)));
    }

    #[actix_rt::test]
    async fn test_run_with_missing_source_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let tests = dir.path().join("test_f.py");
        fs::write(&tests, "def test_f():\n    assert True\n").unwrap();

        let err = run_tests(&RunnerConfig::default(), &dir.path().join("nope.py"), Some(&tests), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::NotFound(_)));
    }
}
