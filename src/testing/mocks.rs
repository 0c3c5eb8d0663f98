//! Recording doubles for the publish and signal boundaries.

use nix::errno::Errno;
use nix::sys::signal::Signal;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::execution::events::{EventPublisher, RunEvent};
use crate::execution::registry::RunId;
use crate::subprocess::{ProcessError, ProcessSignaller};

/// Keeps every published event in order.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<(RunId, RunEvent)>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(RunId, RunEvent)> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn events_for(&self, run_id: &RunId) -> Vec<RunEvent> {
        self.events()
            .into_iter()
            .filter(|(id, _)| id == run_id)
            .map(|(_, event)| event)
            .collect()
    }

    pub fn event_names(&self) -> Vec<&'static str> {
        self.events().iter().map(|(_, event)| event.name()).collect()
    }

    pub fn terminal_events(&self, run_id: &RunId) -> Vec<RunEvent> {
        self.events_for(run_id)
            .into_iter()
            .filter(RunEvent::is_terminal)
            .collect()
    }

    /// Poll until `predicate` holds over the recorded events or `timeout`
    /// elapses. Returns whether it held.
    pub async fn wait_until<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[(RunId, RunEvent)]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if predicate(&self.events()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait for a `complete`, `stopped` or `error` event for `run_id`. Runs
    /// that write to stderr also publish `error` lines, so wait on something
    /// more specific for those.
    pub async fn wait_for_terminal(&self, run_id: &RunId, timeout: Duration) -> Option<RunEvent> {
        let found = self
            .wait_until(timeout, |events| {
                events
                    .iter()
                    .any(|(id, event)| id == run_id && event.is_terminal())
            })
            .await;
        if found {
            self.terminal_events(run_id).into_iter().next()
        } else {
            None
        }
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, run_id: &RunId, event: RunEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((run_id.clone(), event));
    }
}

/// Records signals without touching any process; can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingSignaller {
    signals: Arc<Mutex<Vec<(u32, Signal)>>>,
    fail: bool,
}

impl RecordingSignaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records and then reports `EPERM`.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn signals(&self) -> Vec<(u32, Signal)> {
        self.signals.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, signal: Signal) -> usize {
        self.signals().iter().filter(|(_, s)| *s == signal).count()
    }
}

impl ProcessSignaller for RecordingSignaller {
    fn signal(&self, pid: u32, signal: Signal) -> Result<(), ProcessError> {
        self.signals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((pid, signal));
        if self.fail {
            return Err(ProcessError::SignalFailed {
                pid,
                signal: signal.as_str(),
                source: Errno::EPERM,
            });
        }
        Ok(())
    }
}
