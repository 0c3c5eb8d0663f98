use super::registry::RunId;
use crate::subprocess::ProcessError;

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Invalid run request: {0}")]
    InvalidRunSpec(String),

    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: ProcessError,
    },

    #[error("Failed to stop run {run_id}: {source}")]
    Signal {
        run_id: RunId,
        #[source]
        source: ProcessError,
    },
}

impl ExecutionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ExecutionError::InvalidRunSpec(message.into())
    }

    /// True when the caller's request, not the system, was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ExecutionError::InvalidRunSpec(_))
    }
}
