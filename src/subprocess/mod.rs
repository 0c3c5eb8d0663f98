//! Subprocess abstraction: spawning children with captured output and
//! delivering signals to them.

pub mod builder;
pub mod error;
pub mod runner;
pub mod signal;

pub use builder::ProcessCommandBuilder;
pub use error::ProcessError;
pub use runner::{ExitOutcome, ProcessCommand, ProcessRunner, ProcessStream, TokioProcessRunner};
pub use signal::{NixSignaller, ProcessSignaller};

use std::sync::Arc;

/// Bundles the spawning and signalling halves used by the orchestrator.
#[derive(Clone)]
pub struct SubprocessManager {
    runner: Arc<dyn ProcessRunner>,
    signaller: Arc<dyn ProcessSignaller>,
}

impl SubprocessManager {
    pub fn new(runner: Arc<dyn ProcessRunner>, signaller: Arc<dyn ProcessSignaller>) -> Self {
        Self { runner, signaller }
    }

    pub fn production() -> Self {
        Self::new(Arc::new(TokioProcessRunner), Arc::new(NixSignaller))
    }

    pub fn runner(&self) -> Arc<dyn ProcessRunner> {
        Arc::clone(&self.runner)
    }

    pub fn signaller(&self) -> Arc<dyn ProcessSignaller> {
        Arc::clone(&self.signaller)
    }
}
