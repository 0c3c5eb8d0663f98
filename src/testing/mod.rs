//! Testing utilities and fixtures
//!
//! Runs are exercised against a stand-in for k6: the configured binary is
//! `sh`, so `k6 run <script> ...` becomes `sh run <script> ...` and executes
//! a `run` shell script written into the test's working directory.

pub mod mocks;

pub use mocks::{RecordingPublisher, RecordingSignaller};

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use crate::execution::ExecutionSettings;

/// File name the fake k6 executes.
pub const FAKE_K6_SCRIPT: &str = "run";
/// File name of the fake batch script.
pub const FAKE_BATCH_SCRIPT: &str = "run-all-tests.sh";

/// Scratch directory acting as the dashboard's working directory.
pub struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        std::fs::create_dir_all(temp_dir.path().join("tests"))?;
        std::fs::create_dir_all(temp_dir.path().join("results"))?;
        Ok(Self { temp_dir })
    }

    pub fn temp_path(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    pub fn create_file(&self, relative: &str, content: &str) -> Result<PathBuf> {
        let path = self.temp_dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Body of the fake k6. `$1` is the test script, the remaining arguments
    /// are the flags k6 would receive.
    pub fn fake_k6(&self, body: &str) -> Result<PathBuf> {
        self.create_file(FAKE_K6_SCRIPT, body)
    }

    pub fn fake_batch_script(&self, body: &str) -> Result<PathBuf> {
        self.create_file(FAKE_BATCH_SCRIPT, body)
    }

    /// Settings pointing at the fakes, with short timers.
    pub fn settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            k6_binary: "sh".to_string(),
            batch_shell: "sh".to_string(),
            batch_script: PathBuf::from(FAKE_BATCH_SCRIPT),
            tests_dir: PathBuf::from("tests"),
            results_dir: PathBuf::from("results"),
            working_dir: Some(self.temp_path()),
            default_auth_token: None,
            timezone: chrono_tz::Tz::UTC,
            kill_grace_period: Duration::from_millis(300),
            single_results_delay: Duration::from_millis(100),
            batch_results_delay: Duration::from_millis(150),
            stream_drain_timeout: Duration::from_millis(500),
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.temp_dir.path().join(relative)
    }

    pub fn exists(&self, relative: &Path) -> bool {
        self.temp_dir.path().join(relative).exists()
    }
}

/// Fake k6 body that writes the summary file named after `--summary-export`.
pub const WRITES_SUMMARY: &str = r#"
while [ $# -gt 0 ]; do
  if [ "$1" = "--summary-export" ]; then out="$2"; fi
  shift
done
echo "running"
echo '{"metrics":{}}' > "$out"
"#;
