//! Common test utilities and helpers

#![allow(dead_code)]

use anyhow::Result;
use futures::StreamExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use k6_dashboard::execution::{BroadcastPublisher, EventPublisher, ExecutionSettings, Orchestrator};
use k6_dashboard::server::DashboardServer;
use k6_dashboard::subprocess::SubprocessManager;

pub const WAIT: Duration = Duration::from_secs(5);

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn orchestrator(settings: ExecutionSettings) -> (Arc<Orchestrator>, BroadcastPublisher) {
    let events = BroadcastPublisher::new(256);
    let orchestrator = Arc::new(Orchestrator::new(
        settings,
        SubprocessManager::production(),
        Arc::new(events.clone()) as Arc<dyn EventPublisher>,
    ));
    (orchestrator, events)
}

/// A server on an ephemeral port, shut down through `shutdown`.
pub struct TestServer {
    pub addr: SocketAddr,
    pub orchestrator: Arc<Orchestrator>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<()>>,
}

impl TestServer {
    pub async fn start(settings: ExecutionSettings) -> Result<Self> {
        let (orchestrator, events) = orchestrator(settings);
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();

        let server = DashboardServer::new(Arc::clone(&orchestrator), events);
        let handle = tokio::spawn(server.serve(listener, async {
            rx.await.ok();
        }));

        Ok(Self {
            addr,
            orchestrator,
            shutdown: Some(tx),
            handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect_ws(&self) -> Result<WsStream> {
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", self.addr)).await?;
        // The greeting is sent after the subscription exists
        let hello = next_json(&mut ws).await;
        assert_eq!(hello["event"], "connected");
        Ok(ws)
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
        tokio::time::timeout(Duration::from_secs(10), self.handle).await??
    }
}

/// Next JSON text frame, panicking after [`WAIT`].
pub async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let message = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a WebSocket message")
            .expect("WebSocket closed")
            .expect("WebSocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("valid JSON frame");
        }
    }
}

/// Collect events for `run_id` until one named `last` arrives.
pub async fn collect_until(ws: &mut WsStream, run_id: &str, last: &str) -> Vec<Value> {
    let mut events = Vec::new();
    loop {
        let event = next_json(ws).await;
        if event["runId"] != run_id {
            continue;
        }
        let done = event["event"] == last;
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Whether `pid` names a live, non-zombie process.
pub fn process_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next())
            .map(|state| state != 'Z' && state != 'X')
            .unwrap_or(false),
        Err(_) => false,
    }
}

pub async fn wait_for_process_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    !process_alive(pid)
}

pub async fn wait_for_file(path: &Path, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    path.exists()
}
