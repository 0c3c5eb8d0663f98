use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything the orchestrator needs to build and supervise a run.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// The load-testing executable.
    pub k6_binary: String,
    /// Interpreter for the batch script.
    pub batch_shell: String,
    pub batch_script: PathBuf,
    pub tests_dir: PathBuf,
    pub results_dir: PathBuf,
    /// Directory runs are started in; the server's own when unset.
    pub working_dir: Option<PathBuf>,
    pub default_auth_token: Option<String>,
    pub timezone: Tz,
    /// Delay between SIGTERM and SIGKILL.
    pub kill_grace_period: Duration,
    pub single_results_delay: Duration,
    pub batch_results_delay: Duration,
    /// How long to keep reading output after the process exited.
    pub stream_drain_timeout: Duration,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            k6_binary: "k6".to_string(),
            batch_shell: "bash".to_string(),
            batch_script: PathBuf::from("scripts/run-all-tests.sh"),
            tests_dir: PathBuf::from("tests"),
            results_dir: PathBuf::from("results"),
            working_dir: None,
            default_auth_token: None,
            timezone: Tz::UTC,
            kill_grace_period: Duration::from_secs(5),
            single_results_delay: Duration::from_secs(2),
            batch_results_delay: Duration::from_secs(3),
            stream_drain_timeout: Duration::from_secs(1),
        }
    }
}

impl ExecutionSettings {
    /// `path` as seen from the directory runs are started in.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.working_dir {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }

    pub fn tests_path(&self) -> PathBuf {
        self.resolve(&self.tests_dir)
    }

    pub fn results_path(&self) -> PathBuf {
        self.resolve(&self.results_dir)
    }
}
