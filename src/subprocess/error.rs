use nix::errno::Errno;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to capture {0} of child process")]
    StreamUnavailable(&'static str),

    #[error("Failed to send {signal} to process group {pid}: {source}")]
    SignalFailed {
        pid: u32,
        signal: &'static str,
        #[source]
        source: Errno,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
