//! Per-run lifecycle state shared between the exit watcher and the
//! terminator.

use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::watch;

use super::events::RunEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Stopping,
    Stopped,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Stopped | RunState::Completed | RunState::Failed
        )
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Stopping)
                | (Running, Completed)
                | (Running, Failed)
                | (Stopping, Stopped)
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Stopping => "stopping",
            RunState::Stopped => "stopped",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State machine plus two latches: process exit, and the terminal event
/// once it has been published.
#[derive(Debug)]
pub struct RunLifecycle {
    state: Mutex<RunState>,
    exited: watch::Sender<bool>,
    outcome: watch::Sender<Option<RunEvent>>,
}

impl Default for RunLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLifecycle {
    pub fn new() -> Self {
        let (exited, _) = watch::channel(false);
        let (outcome, _) = watch::channel(None);
        Self {
            state: Mutex::new(RunState::Pending),
            exited,
            outcome,
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next` if the state machine allows it; returns the previous
    /// state on success.
    pub fn transition(&self, next: RunState) -> Option<RunState> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.can_transition_to(next) {
            let previous = *state;
            *state = next;
            Some(previous)
        } else {
            None
        }
    }

    /// Put a stopping run back to running after its stop signal could not
    /// be delivered. Fails once the process has exited or the run settled.
    pub fn abort_stop(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == RunState::Stopping && !self.has_exited() {
            *state = RunState::Running;
            true
        } else {
            false
        }
    }

    pub fn mark_exited(&self) {
        self.exited.send_replace(true);
    }

    pub fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    /// Resolves once the process has exited.
    pub async fn wait_exited(&self) {
        let mut rx = self.exited.subscribe();
        // The sender lives in self, so this only errors if it was dropped
        let _ = rx.wait_for(|exited| *exited).await;
    }

    /// Record the published terminal event. Only the first one sticks.
    pub fn record_outcome(&self, event: &RunEvent) {
        self.outcome.send_if_modified(|outcome| {
            if outcome.is_some() {
                return false;
            }
            *outcome = Some(event.clone());
            true
        });
    }

    pub fn outcome(&self) -> Option<RunEvent> {
        self.outcome.borrow().clone()
    }

    /// Resolves with the terminal event once it has been published.
    pub async fn wait_outcome(&self) -> Option<RunEvent> {
        let mut rx = self.outcome.subscribe();
        let outcome = rx.wait_for(Option::is_some).await.ok()?;
        (*outcome).clone()
    }
}
