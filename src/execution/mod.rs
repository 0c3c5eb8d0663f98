//! Test execution orchestration
//!
//! Spawns one k6 (or batch script) process per run, tracks it under a run id,
//! streams classified output lines as events and stops it on request with a
//! SIGTERM followed by a SIGKILL after a grace period.

pub mod clock;
pub mod error;
pub mod events;
pub mod invocation;
pub mod line_processor;
pub mod orchestrator;
pub mod registry;
pub mod settings;
pub mod state;
pub mod terminator;

pub use clock::{Clock, FixedClock, RunIdGenerator, SystemClock};
pub use error::ExecutionError;
pub use events::{
    BroadcastPublisher, ChannelPublisher, EventPublisher, FanOutPublisher, PublishedEvent,
    ResultsUpdated, RunEvent, TracingPublisher,
};
pub use invocation::{RunMode, RunSpec, RUN_ALL};
pub use line_processor::{LineKind, LineProcessor, OutputLine};
pub use orchestrator::{Orchestrator, StartedRun};
pub use registry::{RunId, RunRegistry, RunSummary, TestExecution};
pub use settings::ExecutionSettings;
pub use state::RunState;
pub use terminator::Terminator;
