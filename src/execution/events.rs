//! Events published while a run progresses, and the publish boundary they
//! cross on their way to connected clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use super::registry::RunId;

/// Payload of the `resultsUpdated` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsUpdated {
    pub message: String,
    pub test_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_file: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Log(String),
    Error(String),
    Complete(String),
    Stopped(String),
    ResultsUpdated(ResultsUpdated),
}

#[derive(Serialize)]
struct MessagePayload<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a str,
}

impl RunEvent {
    /// Topic the event is published under.
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::Log(_) => "log",
            RunEvent::Error(_) => "error",
            RunEvent::Complete(_) => "complete",
            RunEvent::Stopped(_) => "stopped",
            RunEvent::ResultsUpdated(_) => "resultsUpdated",
        }
    }

    /// Whether this kind of event can end a run. Lines read from stderr are
    /// published as `error` too, so only a run's last `error` is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunEvent::Error(_) | RunEvent::Complete(_) | RunEvent::Stopped(_)
        )
    }

    /// Wire payload: `{type, data}` for message events, the struct itself for
    /// `resultsUpdated`.
    pub fn payload(&self) -> Value {
        let data = match self {
            RunEvent::Log(data)
            | RunEvent::Error(data)
            | RunEvent::Complete(data)
            | RunEvent::Stopped(data) => data,
            RunEvent::ResultsUpdated(update) => {
                return serde_json::to_value(update).unwrap_or(Value::Null);
            }
        };

        serde_json::json!(MessagePayload {
            kind: self.name(),
            data,
        })
    }

    pub fn text(&self) -> &str {
        match self {
            RunEvent::Log(data)
            | RunEvent::Error(data)
            | RunEvent::Complete(data)
            | RunEvent::Stopped(data) => data,
            RunEvent::ResultsUpdated(update) => &update.message,
        }
    }
}

/// Envelope sent to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedEvent {
    pub run_id: String,
    pub event: String,
    pub payload: Value,
}

impl PublishedEvent {
    pub fn new(run_id: &RunId, event: &RunEvent) -> Self {
        Self {
            run_id: run_id.to_string(),
            event: event.name().to_string(),
            payload: event.payload(),
        }
    }
}

/// Fire-and-forget publish boundary. Implementations must not block.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, run_id: &RunId, event: RunEvent);
}

/// Fans events out to every subscriber of a broadcast channel.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, run_id: &RunId, event: RunEvent) {
        tracing::trace!(run_id = %run_id, event = event.name(), "Publishing event");
        // No subscribers is fine: delivery is best effort
        self.sender.send(PublishedEvent::new(run_id, &event)).ok();
    }
}

/// Writes every event to the tracing subscriber. Output lines go out at
/// debug level.
pub struct TracingPublisher;

impl EventPublisher for TracingPublisher {
    fn publish(&self, run_id: &RunId, event: RunEvent) {
        match &event {
            RunEvent::Log(text) => tracing::debug!(run_id = %run_id, "{}", text),
            RunEvent::Error(text) => tracing::warn!(run_id = %run_id, "{}", text),
            other => tracing::info!(run_id = %run_id, "{}", other.text()),
        }
    }
}

/// Hands events to a single in-process consumer.
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<(RunId, RunEvent)>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(RunId, RunEvent)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, run_id: &RunId, event: RunEvent) {
        // The consumer may already be gone
        self.sender.send((run_id.clone(), event)).ok();
    }
}

/// Publishes every event to each inner publisher, in order.
#[derive(Default)]
pub struct FanOutPublisher {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl FanOutPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }
}

impl EventPublisher for FanOutPublisher {
    fn publish(&self, run_id: &RunId, event: RunEvent) {
        for publisher in &self.publishers {
            publisher.publish(run_id, event.clone());
        }
    }
}
