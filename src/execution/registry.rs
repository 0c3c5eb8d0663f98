//! In-memory registry of live runs.
//!
//! The registry is the only state shared between concurrently running test
//! executions. Its lock guards map mutations only and is never held across
//! I/O: callers get `Arc<TestExecution>` clones and act on those.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use super::invocation::RunMode;
use super::state::{RunLifecycle, RunState};
use crate::subprocess::ProcessCommand;

/// Opaque run identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RunId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RunId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The only path to a spawned child's signals. The child itself is owned by
/// the exit watcher task; this handle carries its pid and lifecycle.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    lifecycle: Arc<RunLifecycle>,
    escalation: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessHandle {
    pub fn new(pid: u32, lifecycle: Arc<RunLifecycle>) -> Self {
        Self {
            pid,
            lifecycle,
            escalation: Mutex::new(None),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn lifecycle(&self) -> &Arc<RunLifecycle> {
        &self.lifecycle
    }

    /// Attach the pending forced-kill timer.
    pub fn set_escalation(&self, task: JoinHandle<()>) {
        let mut slot = self.escalation.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Abort the forced-kill timer, if one is pending. Returns whether a timer
    /// was still attached.
    pub fn cancel_escalation(&self) -> bool {
        let task = self
            .escalation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match task {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

#[derive(Debug)]
pub struct TestExecution {
    pub id: RunId,
    /// Distinguishes successive registrations under the same id.
    pub serial: u64,
    pub mode: RunMode,
    pub test_name: String,
    pub profile: String,
    pub environment: String,
    pub command: ProcessCommand,
    pub started_at: DateTime<Utc>,
    /// Timezone-adjusted start stamp shared with the artifact name.
    pub timestamp: String,
    pub artifact_path: Option<PathBuf>,
    pub handle: ProcessHandle,
}

impl TestExecution {
    pub fn state(&self) -> RunState {
        self.handle.lifecycle().state()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.id.clone(),
            test_name: self.test_name.clone(),
            mode: self.mode,
            profile: self.profile.clone(),
            environment: self.environment.clone(),
            state: self.state(),
            started_at: self.started_at,
            pid: self.handle.pid(),
            result_file: self
                .artifact_path
                .as_ref()
                .map(|p| p.display().to_string()),
        }
    }
}

/// Serializable view of a registered run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: RunId,
    pub test_name: String,
    pub mode: RunMode,
    pub profile: String,
    pub environment: String,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub pid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_file: Option<String>,
}

#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<RunId, Arc<TestExecution>>>,
    next_serial: AtomicU64,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<RunId, Arc<TestExecution>>> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Serial number for the next execution to be registered.
    pub fn next_serial(&self) -> u64 {
        self.next_serial.fetch_add(1, Ordering::Relaxed)
    }

    /// Insert under the execution's id, returning any entry it replaced. The
    /// replaced run's process is left running and unmanaged.
    pub fn register(&self, execution: Arc<TestExecution>) -> Option<Arc<TestExecution>> {
        let id = execution.id.clone();
        self.runs().insert(id, execution)
    }

    pub fn lookup(&self, id: &RunId) -> Option<Arc<TestExecution>> {
        self.runs().get(id).cloned()
    }

    pub fn unregister(&self, id: &RunId) -> Option<Arc<TestExecution>> {
        self.runs().remove(id)
    }

    /// Remove the entry only if it is still the registration identified by
    /// `serial`, so a finished run never evicts a successor reusing its id.
    pub fn unregister_if_current(&self, id: &RunId, serial: u64) -> bool {
        let mut runs = self.runs();
        match runs.get(id) {
            Some(current) if current.serial == serial => {
                runs.remove(id);
                true
            }
            _ => false,
        }
    }

    pub fn list_running(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self.runs().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self) -> Vec<RunSummary> {
        let executions: Vec<Arc<TestExecution>> = self.runs().values().cloned().collect();
        let mut summaries: Vec<RunSummary> = executions.iter().map(|e| e.summary()).collect();
        summaries.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.run_id.cmp(&b.run_id)));
        summaries
    }

    pub fn len(&self) -> usize {
        self.runs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs().is_empty()
    }
}
