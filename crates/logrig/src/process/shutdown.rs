//! Signal delivery and termination of the daemon process.

use std::io;
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use super::error::LifecycleError;

/// Signals the controller sends to a running daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// Re-read the configuration in place (`SIGHUP`).
    Reload,
    /// Shut down gracefully (`SIGTERM`).
    Terminate,
}

impl DaemonSignal {
    const fn as_nix(self) -> Signal {
        match self {
            Self::Reload => Signal::SIGHUP,
            Self::Terminate => Signal::SIGTERM,
        }
    }
}

/// Delivery seam for daemon signals.
#[cfg_attr(test, mockall::automock)]
pub trait DaemonSignaller: Send {
    /// Delivers `signal` to `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidPid`] or
    /// [`LifecycleError::SignalFailed`] when delivery fails.
    fn send(&self, pid: u32, signal: DaemonSignal) -> Result<(), LifecycleError>;
}

/// Delivers signals with `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSignaller;

impl DaemonSignaller for SystemSignaller {
    fn send(&self, pid: u32, signal: DaemonSignal) -> Result<(), LifecycleError> {
        let raw = i32::try_from(pid)
            .ok()
            .filter(|raw| *raw > 0)
            .ok_or(LifecycleError::InvalidPid { pid })?;
        kill(Pid::from_raw(raw), signal.as_nix()).map_err(|errno| LifecycleError::SignalFailed {
            pid,
            source: io::Error::from(errno),
        })
    }
}

/// Polls `child` until it exits or `grace` elapses.
pub(super) fn wait_for_exit(
    child: &mut Child,
    grace: Duration,
    poll_interval: Duration,
) -> Result<Option<ExitStatus>, LifecycleError> {
    let deadline = Instant::now() + grace;
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|source| LifecycleError::MonitorChild { source })?
        {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(poll_interval.min(deadline - now));
    }
}

/// Kills `child` and reaps it.
pub(super) fn kill_child(child: &mut Child) -> Result<(), LifecycleError> {
    let pid = child.id();
    match child.kill() {
        Ok(()) => {}
        // Already exited; reaping below still succeeds.
        Err(error) if error.kind() == io::ErrorKind::InvalidInput => {}
        Err(source) => return Err(LifecycleError::KillFailed { pid, source }),
    }
    child
        .wait()
        .map(|_| ())
        .map_err(|source| LifecycleError::MonitorChild { source })
}
