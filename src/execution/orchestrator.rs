//! Starting runs, supervising them until exit, and stopping them on request.
//!
//! Every started run gets three tasks: one reader per output stream and an
//! exit watcher. The watcher owns the exit-status future, drains the readers,
//! settles the run into exactly one terminal state and publishes the matching
//! terminal event. The registry is the only state shared between runs.

use futures::StreamExt;
use nix::sys::signal::Signal;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::clock::{Clock, RunIdGenerator, SystemClock};
use super::error::ExecutionError;
use super::events::{EventPublisher, ResultsUpdated, RunEvent};
use super::invocation::{Invocation, RunMode, RunSpec};
use super::line_processor::{LineKind, LineProcessor, OutputLine};
use super::registry::{ProcessHandle, RunId, RunRegistry, RunSummary, TestExecution};
use super::settings::ExecutionSettings;
use super::state::{RunLifecycle, RunState};
use super::terminator::Terminator;
use crate::subprocess::runner::{ProcessStatusFut, ProcessStreamFut};
use crate::subprocess::{
    ExitOutcome, ProcessError, ProcessRunner, ProcessSignaller, SubprocessManager,
};

/// Returned to the caller once a run has been spawned and registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedRun {
    pub run_id: RunId,
    pub mode: RunMode,
    pub timestamp: String,
    #[serde(rename = "resultFile", skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
enum StreamOrigin {
    Stdout,
    Stderr,
}

impl StreamOrigin {
    fn name(self) -> &'static str {
        match self {
            StreamOrigin::Stdout => "stdout",
            StreamOrigin::Stderr => "stderr",
        }
    }
}

/// What the background tasks of a run need; cheap to clone into them.
#[derive(Clone)]
struct RunContext {
    registry: Arc<RunRegistry>,
    publisher: Arc<dyn EventPublisher>,
    settings: Arc<ExecutionSettings>,
    processor: LineProcessor,
    signaller: Arc<dyn ProcessSignaller>,
}

pub struct Orchestrator {
    context: RunContext,
    runner: Arc<dyn ProcessRunner>,
    clock: Arc<dyn Clock>,
    ids: RunIdGenerator,
    terminator: Terminator,
}

impl Orchestrator {
    pub fn new(
        settings: ExecutionSettings,
        subprocess: SubprocessManager,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let registry = Arc::new(RunRegistry::new());
        let terminator = Terminator::new(
            Arc::clone(&registry),
            Arc::clone(&publisher),
            subprocess.signaller(),
            settings.kill_grace_period,
        );

        Self {
            context: RunContext {
                registry,
                publisher,
                settings: Arc::new(settings),
                processor: LineProcessor::new(),
                signaller: subprocess.signaller(),
            },
            runner: subprocess.runner(),
            clock: Arc::new(SystemClock),
            ids: RunIdGenerator::new(),
            terminator,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.context.registry
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.context.settings
    }

    /// Spawn a run and return as soon as it is registered. Output, the
    /// terminal event and the results refresh arrive through the publisher.
    ///
    /// An invalid request fails without publishing anything. A spawn failure
    /// publishes one `error` event and leaves nothing registered.
    pub async fn start(&self, spec: RunSpec) -> Result<StartedRun, ExecutionError> {
        let (started, _) = self.start_tracked(spec).await?;
        Ok(started)
    }

    /// [`Orchestrator::start`], also handing back the run's execution so the
    /// caller can follow it after it leaves the registry.
    pub async fn start_tracked(
        &self,
        spec: RunSpec,
    ) -> Result<(StartedRun, Arc<TestExecution>), ExecutionError> {
        let settings = &self.context.settings;
        let invocation = Invocation::plan(&spec, settings, self.clock.now(), &self.ids)?;
        let run_id = invocation.run_id.clone();

        info!(
            run_id = %run_id,
            mode = ?invocation.mode,
            "Starting run: {}",
            invocation.command.display()
        );

        let process = match self.runner.spawn(invocation.command.clone()).await {
            Ok(process) => process,
            Err(source) => {
                error!(run_id = %run_id, "Failed to spawn run: {}", source);
                self.context.publisher.publish(
                    &run_id,
                    RunEvent::Error(format!("❌ Failed to start test: {source}")),
                );
                return Err(ExecutionError::Spawn {
                    command: invocation.command.display(),
                    source,
                });
            }
        };

        let lifecycle = Arc::new(RunLifecycle::new());
        lifecycle.transition(RunState::Running);

        let execution = Arc::new(TestExecution {
            id: run_id.clone(),
            serial: self.context.registry.next_serial(),
            mode: invocation.mode,
            test_name: invocation.test_name.clone(),
            profile: invocation.profile.clone(),
            environment: invocation.environment.clone(),
            command: invocation.command.clone(),
            started_at: invocation.started_at,
            timestamp: invocation.timestamp.clone(),
            artifact_path: invocation.artifact_path.clone(),
            handle: ProcessHandle::new(process.pid, lifecycle),
        });

        if let Some(replaced) = self.context.registry.register(Arc::clone(&execution)) {
            warn!(
                run_id = %run_id,
                pid = replaced.handle.pid(),
                "Run id reused; previous process is no longer tracked"
            );
        }

        self.announce(&invocation);

        let readers = [
            spawn_reader(&self.context, &run_id, process.stdout, StreamOrigin::Stdout),
            spawn_reader(&self.context, &run_id, process.stderr, StreamOrigin::Stderr),
        ];
        tokio::spawn(supervise(
            self.context.clone(),
            Arc::clone(&execution),
            process.status,
            readers,
        ));

        let started = StartedRun {
            run_id,
            mode: invocation.mode,
            timestamp: invocation.timestamp,
            artifact_path: invocation.artifact_path,
        };
        Ok((started, execution))
    }

    /// See [`Terminator::stop`].
    pub fn stop(&self, id: &RunId) -> Result<bool, ExecutionError> {
        self.terminator.stop(id)
    }

    pub fn list_running(&self) -> Vec<RunId> {
        self.context.registry.list_running()
    }

    pub fn snapshot(&self) -> Vec<RunSummary> {
        self.context.registry.snapshot()
    }

    /// Stop every registered run and wait for their processes to exit,
    /// allowing for the forced kill. Returns how many runs were stopped.
    pub async fn shutdown(&self) -> usize {
        let executions: Vec<Arc<TestExecution>> = self
            .context
            .registry
            .list_running()
            .iter()
            .filter_map(|id| self.context.registry.lookup(id))
            .collect();

        let mut stopped = 0;
        for execution in &executions {
            match self.stop(&execution.id) {
                Ok(true) => stopped += 1,
                Ok(false) => {}
                Err(e) => warn!(run_id = %execution.id, "Stop during shutdown failed: {}", e),
            }
        }

        let limit = self.context.settings.kill_grace_period + Duration::from_secs(1);
        let exits = executions
            .iter()
            .map(|execution| execution.handle.lifecycle().wait_exited());
        if tokio::time::timeout(limit, futures::future::join_all(exits))
            .await
            .is_err()
        {
            warn!("Runs still alive {:?} after shutdown began", limit);
        }
        stopped
    }

    fn announce(&self, invocation: &Invocation) {
        let publisher = &self.context.publisher;
        let id = &invocation.run_id;

        let started = match invocation.mode {
            RunMode::Single => format!("🚀 Starting test: {}", invocation.test_name),
            RunMode::Batch => "🚀 Starting all tests".to_string(),
        };
        publisher.publish(id, RunEvent::Log(started));
        publisher.publish(
            id,
            RunEvent::Log(format!(
                "📋 Profile: {} | Environment: {}",
                invocation.profile, invocation.environment
            )),
        );
        publisher.publish(
            id,
            RunEvent::Log(format!("🕐 Start time: {}", invocation.timestamp)),
        );
        let destination = invocation
            .artifact_display()
            .unwrap_or_else(|| self.context.settings.results_dir.display().to_string());
        publisher.publish(
            id,
            RunEvent::Log(format!("📁 Results will be saved to: {destination}")),
        );
    }
}

fn line_event(line: OutputLine) -> RunEvent {
    match line.kind {
        LineKind::Error => RunEvent::Error(line.text),
        LineKind::Log | LineKind::Progress => RunEvent::Log(line.text),
    }
}

fn spawn_reader(
    context: &RunContext,
    run_id: &RunId,
    mut stream: ProcessStreamFut,
    origin: StreamOrigin,
) -> JoinHandle<()> {
    let publisher = Arc::clone(&context.publisher);
    let processor = context.processor;
    let run_id = run_id.clone();

    tokio::spawn(async move {
        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(run_id = %run_id, "Reading {} failed: {}", origin.name(), e);
                    break;
                }
            };
            let lines = match origin {
                StreamOrigin::Stdout => processor.process(&bytes),
                StreamOrigin::Stderr => processor.process_error(&bytes),
            };
            for line in lines {
                publisher.publish(&run_id, line_event(line));
            }
        }
        debug!(run_id = %run_id, "{} closed", origin.name());
    })
}

/// Exit watcher: the single place a run reaches a terminal state on its own.
///
/// The outcome is decided and the run unregistered as soon as the process
/// is reaped; the terminal event waits until buffered output is published.
async fn supervise(
    context: RunContext,
    execution: Arc<TestExecution>,
    status: ProcessStatusFut,
    mut readers: [JoinHandle<()>; 2],
) {
    let result = status.await;
    let lifecycle = execution.handle.lifecycle();
    if result.is_err() {
        reap_group(&context, &execution);
    }
    lifecycle.mark_exited();
    execution.handle.cancel_escalation();

    let completed = matches!(result, Ok(ExitOutcome::Success));
    let terminal = settle(&execution, result);
    context
        .registry
        .unregister_if_current(&execution.id, execution.serial);
    info!(run_id = %execution.id, state = %execution.state(), "Run finished");

    // Descendants may still hold the pipes open after the child exits
    let drain = futures::future::join_all(readers.iter_mut());
    if tokio::time::timeout(context.settings.stream_drain_timeout, drain)
        .await
        .is_err()
    {
        debug!(run_id = %execution.id, "Output still open after exit, detaching readers");
        for reader in &readers {
            reader.abort();
        }
    }

    let Some(event) = terminal else {
        return;
    };
    context.publisher.publish(&execution.id, event.clone());
    lifecycle.record_outcome(&event);

    if completed {
        refresh_results(&context, &execution).await;
    }
}

/// The exit status is unknown, so make sure nothing of the run survives.
fn reap_group(context: &RunContext, execution: &TestExecution) {
    let pid = execution.handle.pid();
    if let Err(e) = context.signaller.signal(pid, Signal::SIGKILL) {
        warn!(run_id = %execution.id, pid, "Failed to kill process group: {}", e);
    }
}

/// Move the run into its terminal state. Returns the event to publish, or
/// `None` when a stop request already published one.
fn settle(execution: &TestExecution, result: Result<ExitOutcome, ProcessError>) -> Option<RunEvent> {
    let lifecycle = execution.handle.lifecycle();
    let batch = execution.mode == RunMode::Batch;

    let (target, event) = match result {
        Ok(ExitOutcome::Signal(signal)) => {
            let name = Signal::try_from(signal)
                .map(|s| s.as_str())
                .unwrap_or("unknown");
            let event = RunEvent::Stopped(format!("🛑 Test terminated by signal {name}"));
            // Signal presence wins over any exit code
            let requested = lifecycle.transition(RunState::Stopping).is_none();
            lifecycle.transition(RunState::Stopped);
            return if requested { None } else { Some(event) };
        }
        Ok(ExitOutcome::Success) => {
            let message = if batch {
                "✅ All tests completed successfully"
            } else {
                "✅ Test completed successfully"
            };
            (RunState::Completed, RunEvent::Complete(message.to_string()))
        }
        Ok(ExitOutcome::Code(code)) => (
            RunState::Failed,
            RunEvent::Error(format!("❌ Test failed with exit code {code}")),
        ),
        Err(e) => {
            error!(run_id = %execution.id, "Waiting for run failed: {}", e);
            (
                RunState::Failed,
                RunEvent::Error(format!("❌ Test execution error: {e}")),
            )
        }
    };

    if lifecycle.transition(target).is_some() {
        return Some(event);
    }

    // A stop was requested; the terminator already published `stopped`
    lifecycle.transition(RunState::Stopped);
    None
}

/// Tell clients to re-read artifacts once the tool has had time to flush
/// them.
async fn refresh_results(context: &RunContext, execution: &TestExecution) {
    let (delay, message) = match execution.mode {
        RunMode::Single => (context.settings.single_results_delay, "Test results updated"),
        RunMode::Batch => (context.settings.batch_results_delay, "All test results updated"),
    };
    tokio::time::sleep(delay).await;

    let publisher = &context.publisher;
    publisher.publish(&execution.id, RunEvent::Log("📊 Results updated".to_string()));
    publisher.publish(
        &execution.id,
        RunEvent::ResultsUpdated(ResultsUpdated {
            message: message.to_string(),
            test_name: execution.test_name.clone(),
            result_file: execution
                .artifact_path
                .as_ref()
                .map(|p| p.display().to_string()),
            timestamp: execution.timestamp.clone(),
        }),
    );
}
