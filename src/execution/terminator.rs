//! Graceful-then-forced termination of a single run.

use nix::sys::signal::Signal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::error::ExecutionError;
use super::events::{EventPublisher, RunEvent};
use super::registry::{RunId, RunRegistry, TestExecution};
use super::state::RunState;
use crate::subprocess::ProcessSignaller;

pub struct Terminator {
    registry: Arc<RunRegistry>,
    publisher: Arc<dyn EventPublisher>,
    signaller: Arc<dyn ProcessSignaller>,
    grace_period: Duration,
}

impl Terminator {
    pub fn new(
        registry: Arc<RunRegistry>,
        publisher: Arc<dyn EventPublisher>,
        signaller: Arc<dyn ProcessSignaller>,
        grace_period: Duration,
    ) -> Self {
        Self {
            registry,
            publisher,
            signaller,
            grace_period,
        }
    }

    /// Ask a run to stop. `Ok(false)` means there was nothing to stop.
    ///
    /// Returns once SIGTERM has been sent; the run is unregistered and
    /// `stopped` published at that point, before the process has exited. A
    /// forced kill follows after the grace period unless the process exits
    /// first. If SIGTERM cannot be delivered the run stays registered and
    /// running so the stop can be retried. Must be called from within a
    /// tokio runtime.
    pub fn stop(&self, id: &RunId) -> Result<bool, ExecutionError> {
        let Some(execution) = self.registry.lookup(id) else {
            debug!(run_id = %id, "Stop requested for unknown run");
            return Ok(false);
        };
        let lifecycle = execution.handle.lifecycle();

        // The exit watcher owns the outcome once the process is gone
        if lifecycle.has_exited() {
            debug!(run_id = %id, "Stop requested after the process exited");
            return Ok(false);
        }

        // Fails if the run already finished or a stop is underway
        if lifecycle.transition(RunState::Stopping).is_none() {
            debug!(
                run_id = %id,
                state = %execution.state(),
                "Stop requested for run that is not running"
            );
            return Ok(false);
        }

        let pid = execution.handle.pid();
        info!(run_id = %id, pid, "Stopping run");

        if let Err(source) = self.signaller.signal(pid, Signal::SIGTERM) {
            error!(run_id = %id, pid, "Failed to send SIGTERM: {}", source);
            self.publisher.publish(
                id,
                RunEvent::Error(format!("❌ Failed to stop test: {source}")),
            );
            if !lifecycle.abort_stop() {
                // Exited meanwhile; the watcher left the outcome to us
                self.finish(&execution);
            }
            return Err(ExecutionError::Signal {
                run_id: id.clone(),
                source,
            });
        }

        self.schedule_escalation(Arc::clone(&execution));
        self.finish(&execution);
        Ok(true)
    }

    fn finish(&self, execution: &TestExecution) {
        self.registry
            .unregister_if_current(&execution.id, execution.serial);
        let event = RunEvent::Stopped("🛑 Test stopped by user".to_string());
        self.publisher.publish(&execution.id, event.clone());
        execution.handle.lifecycle().record_outcome(&event);
    }

    /// Arm the one-shot forced kill. It is cancelled when the process exits.
    fn schedule_escalation(&self, execution: Arc<TestExecution>) {
        let signaller = Arc::clone(&self.signaller);
        let grace_period = self.grace_period;
        let task_execution = Arc::clone(&execution);

        let task = tokio::spawn(async move {
            let execution = task_execution;
            let lifecycle = Arc::clone(execution.handle.lifecycle());
            let pid = execution.handle.pid();

            tokio::select! {
                _ = lifecycle.wait_exited() => {
                    debug!(run_id = %execution.id, pid, "Exited within grace period");
                }
                _ = tokio::time::sleep(grace_period) => {
                    if lifecycle.has_exited() {
                        return;
                    }
                    warn!(
                        run_id = %execution.id,
                        pid,
                        "Still running after {:?}, sending SIGKILL",
                        grace_period
                    );
                    if let Err(e) = signaller.signal(pid, Signal::SIGKILL) {
                        error!(run_id = %execution.id, pid, "Forced kill failed: {}", e);
                    }
                }
            }
        });

        execution.handle.set_escalation(task);
    }
}
