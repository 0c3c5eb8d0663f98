use anyhow::Result;
use std::sync::Arc;

use crate::config::DashboardConfig;
use crate::execution::{
    BroadcastPublisher, EventPublisher, FanOutPublisher, Orchestrator, TracingPublisher,
};
use crate::server::DashboardServer;
use crate::subprocess::SubprocessManager;

pub async fn run_serve_command(
    mut config: DashboardConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;

    let events = BroadcastPublisher::new(config.server.event_buffer);
    let publisher = FanOutPublisher::new()
        .with(Arc::new(events.clone()))
        .with(Arc::new(TracingPublisher));
    let orchestrator = Arc::new(Orchestrator::new(
        config.execution_settings()?,
        SubprocessManager::production(),
        Arc::new(publisher) as Arc<dyn EventPublisher>,
    ));

    tracing::info!(
        "Tests in {}, results in {}",
        orchestrator.settings().tests_path().display(),
        orchestrator.settings().results_path().display()
    );

    DashboardServer::new(orchestrator, events)
        .start(&config.server.host, config.server.port)
        .await
}
