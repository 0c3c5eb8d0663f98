//! Foreground execution of a single run from the terminal.

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::cli::args::RunArgs;
use crate::config::DashboardConfig;
use crate::execution::{
    ChannelPublisher, EventPublisher, Orchestrator, RunEvent, RunId, RunSpec, StartedRun,
    TestExecution,
};
use crate::subprocess::SubprocessManager;

/// Start the run, print its output and exit with its outcome. Ctrl-C stops
/// the run.
pub async fn run_test_command(config: &DashboardConfig, args: RunArgs) -> Result<()> {
    let (publisher, events) = ChannelPublisher::new();
    let orchestrator = Orchestrator::new(
        config.execution_settings()?,
        SubprocessManager::production(),
        Arc::new(publisher) as Arc<dyn EventPublisher>,
    );

    let mut spec = RunSpec::new(&args.test, &args.profile, &args.environment);
    spec.auth_token = args.token;

    let (started, execution) = orchestrator.start_tracked(spec).await?;

    let outcome = follow(&orchestrator, &started, &execution, events).await;

    // Give a stopped process time to exit, and the forced kill time to fire
    let limit = orchestrator.settings().kill_grace_period + Duration::from_secs(1);
    tokio::time::timeout(limit, execution.handle.lifecycle().wait_exited())
        .await
        .ok();

    match outcome {
        Some(RunEvent::Complete(_)) => {
            if let Some(path) = &started.artifact_path {
                println!("Results: {}", path.display());
            }
            Ok(())
        }
        Some(event) => bail!("{}", event.text()),
        None => bail!("Run {} ended without an outcome", started.run_id),
    }
}

/// Print events until the run's terminal event has been published, which
/// is returned. Lines queued before it are printed first.
async fn follow(
    orchestrator: &Orchestrator,
    started: &StartedRun,
    execution: &TestExecution,
    mut events: UnboundedReceiver<(RunId, RunEvent)>,
) -> Option<RunEvent> {
    let lifecycle = execution.handle.lifecycle();
    let mut interrupted = false;

    let outcome = loop {
        tokio::select! {
            Some((run_id, event)) = events.recv() => {
                if run_id == started.run_id {
                    print_event(&event);
                }
            }
            outcome = lifecycle.wait_outcome() => break outcome,
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if let Err(e) = signal {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                    continue;
                }
                eprintln!("Stopping {}...", started.run_id);
                if let Err(e) = orchestrator.stop(&started.run_id) {
                    tracing::error!("{}", e);
                }
            }
        }
    };

    while let Ok((run_id, event)) = events.try_recv() {
        if run_id == started.run_id {
            print_event(&event);
        }
    }
    outcome
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::Error(text) => eprintln!("{text}"),
        other => println!("{}", other.text()),
    }
}
