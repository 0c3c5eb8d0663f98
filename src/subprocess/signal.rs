//! Signal delivery to spawned process groups.
//!
//! Every child is started as the leader of its own process group, so the
//! group id equals the child's pid. Signalling the group rather than the pid
//! reaches anything a batch script forks.

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;

use super::error::ProcessError;

pub trait ProcessSignaller: Send + Sync {
    fn signal(&self, pid: u32, signal: Signal) -> Result<(), ProcessError>;
}

pub struct NixSignaller;

impl ProcessSignaller for NixSignaller {
    fn signal(&self, pid: u32, signal: Signal) -> Result<(), ProcessError> {
        let raw = i32::try_from(pid).map_err(|_| ProcessError::SignalFailed {
            pid,
            signal: signal.as_str(),
            source: Errno::EINVAL,
        })?;

        match killpg(Pid::from_raw(raw), signal) {
            Ok(()) => {
                tracing::debug!(pid, signal = signal.as_str(), "Signal delivered");
                Ok(())
            }
            // Group already gone
            Err(Errno::ESRCH) => {
                tracing::debug!(pid, signal = signal.as_str(), "Process group already exited");
                Ok(())
            }
            Err(source) => Err(ProcessError::SignalFailed {
                pid,
                signal: signal.as_str(),
                source,
            }),
        }
    }
}
