use async_trait::async_trait;
use futures::stream::Stream;
use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use super::error::ProcessError;

/// Size of a single read from a child's output pipe.
const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Overlay applied on top of the inherited environment.
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

/// Keys whose `KEY=value` arguments are masked when a command is displayed.
const SECRET_KEY_MARKERS: [&str; 3] = ["TOKEN", "SECRET", "PASSWORD"];

impl ProcessCommand {
    /// Command line for logs, with credential values masked.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(self.args.iter().map(|arg| redact_arg(arg)));
        parts.join(" ")
    }
}

fn redact_arg(arg: &str) -> String {
    match arg.split_once('=') {
        Some((key, _))
            if SECRET_KEY_MARKERS
                .iter()
                .any(|marker| key.to_ascii_uppercase().contains(marker)) =>
        {
            format!("{key}=***")
        }
        _ => arg.to_string(),
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    Code(i32),
    Signal(i32),
}

impl ExitOutcome {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            ExitOutcome::Signal(signal)
        } else {
            match status.code() {
                Some(0) => ExitOutcome::Success,
                Some(code) => ExitOutcome::Code(code),
                None => ExitOutcome::Code(-1),
            }
        }
    }
}

pub type ProcessStreamItem = Result<Vec<u8>, ProcessError>;
pub type ProcessStreamFut = Pin<Box<dyn Stream<Item = ProcessStreamItem> + Send>>;
pub type ProcessStatusFut =
    Pin<Box<dyn futures::Future<Output = Result<ExitOutcome, ProcessError>> + Send>>;

/// A running child: its pid, raw output chunks and a future resolving on exit.
///
/// The status future owns the child handle; dropping it does not kill the
/// process.
pub struct ProcessStream {
    pub pid: u32,
    pub stdout: ProcessStreamFut,
    pub stderr: ProcessStreamFut,
    pub status: ProcessStatusFut,
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn spawn(&self, command: ProcessCommand) -> Result<ProcessStream, ProcessError>;
}

pub struct TokioProcessRunner;

impl TokioProcessRunner {
    /// Create a stream of raw chunks from a child's pipe. Ends on EOF or after
    /// the first read error.
    fn create_chunk_stream<R>(reader: R) -> ProcessStreamFut
    where
        R: tokio::io::AsyncRead + Send + Unpin + 'static,
    {
        use tokio::io::AsyncReadExt;

        Box::pin(futures::stream::unfold(Some(reader), |state| async move {
            let mut reader = state?;
            let mut buf = vec![0u8; CHUNK_SIZE];
            match reader.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok(buf), Some(reader)))
                }
                Err(e) => Some((Err(ProcessError::Io(e)), None)),
            }
        })) as ProcessStreamFut
    }

    fn create_status_future(mut child: tokio::process::Child, program: String) -> ProcessStatusFut {
        Box::pin(async move {
            let status = child.wait().await.map_err(|e| {
                tracing::warn!("Waiting on '{}' failed: {}", program, e);
                ProcessError::Io(e)
            })?;
            Ok(ExitOutcome::from_status(status))
        })
    }

    fn log_command_start(command: &ProcessCommand) {
        tracing::debug!("Executing subprocess: {}", command.display());

        if !command.env.is_empty() {
            tracing::trace!(
                "Environment overlay: {} vars, {} bytes",
                command.env.len(),
                command
                    .env
                    .iter()
                    .map(|(k, v)| k.len() + v.len() + 2)
                    .sum::<usize>()
            );
        }

        if let Some(ref dir) = command.working_dir {
            tracing::trace!("Working directory: {:?}", dir);
        }
    }

    fn configure_command(command: &ProcessCommand) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.program);

        // Own process group so a stop reaches every descendant
        cmd.process_group(0);

        cmd.args(&command.args);

        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    fn map_spawn_error(error: std::io::Error, command: &ProcessCommand) -> ProcessError {
        tracing::error!(
            "Failed to spawn '{}': {:?} (kind: {:?})",
            command.program,
            error,
            error.kind()
        );

        if error.kind() == std::io::ErrorKind::NotFound {
            ProcessError::CommandNotFound(command.program.clone())
        } else {
            ProcessError::SpawnFailed {
                command: command.display(),
                source: error,
            }
        }
    }

    fn extract_stream<T>(stream: Option<T>, stream_name: &'static str) -> Result<T, ProcessError> {
        stream.ok_or(ProcessError::StreamUnavailable(stream_name))
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn spawn(&self, command: ProcessCommand) -> Result<ProcessStream, ProcessError> {
        Self::log_command_start(&command);

        let mut cmd = Self::configure_command(&command);
        let mut child = cmd
            .spawn()
            .map_err(|e| Self::map_spawn_error(e, &command))?;

        let pid = child
            .id()
            .ok_or(ProcessError::StreamUnavailable("pid"))?;
        let stdout = Self::extract_stream(child.stdout.take(), "stdout")?;
        let stderr = Self::extract_stream(child.stderr.take(), "stderr")?;

        tracing::debug!(pid, "Spawned '{}'", command.program);

        Ok(ProcessStream {
            pid,
            stdout: Self::create_chunk_stream(stdout),
            stderr: Self::create_chunk_stream(stderr),
            status: Self::create_status_future(child, command.program.clone()),
        })
    }
}
