//! Error types for daemon lifecycle operations.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::types::DaemonState;

/// Errors raised while starting, reloading or stopping the daemon.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The operation is not valid in the current state.
    #[error("cannot {operation} while the daemon is {state}")]
    InvalidState {
        /// Requested operation.
        operation: &'static str,
        /// State at the time of the request.
        state: DaemonState,
    },
    /// The readiness marker did not appear in time.
    #[error("timed out after {timeout_ms} ms waiting for '{marker}' in {console:?}")]
    StartupTimeout {
        /// Marker that was awaited.
        marker: String,
        /// Console log that was watched.
        console: PathBuf,
        /// Configured wait.
        timeout_ms: u64,
    },
    /// The reload marker did not appear in time.
    #[error("timed out after {timeout_ms} ms waiting for '{marker}' in {console:?}")]
    ReloadTimeout {
        /// Marker that was awaited.
        marker: String,
        /// Console log that was watched.
        console: PathBuf,
        /// Configured wait.
        timeout_ms: u64,
    },
    /// The daemon exited before reporting readiness.
    #[error("daemon exited before reporting ready (status: {exit_status:?}); see {console:?}")]
    StartupFailed {
        /// Exit code, when the daemon exited normally.
        exit_status: Option<i32>,
        /// Console log holding the daemon's output.
        console: PathBuf,
    },
    /// The daemon exited while reloading.
    #[error("daemon exited during reload (status: {exit_status:?}); see {console:?}")]
    ReloadFailed {
        /// Exit code, when the daemon exited normally.
        exit_status: Option<i32>,
        /// Console log holding the daemon's output.
        console: PathBuf,
    },
    /// The daemon binary could not be spawned.
    #[error("failed to spawn daemon binary '{binary:?}': {source}")]
    LaunchDaemon {
        /// Binary that was launched.
        binary: OsString,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Polling the child process failed.
    #[error("failed to monitor daemon process: {source}")]
    MonitorChild {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The console log could not be opened or read.
    #[error("failed to access daemon console {path:?}: {source}")]
    ReadConsole {
        /// Console log path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The configuration file could not be written.
    #[error("failed to write configuration {path:?}: {source}")]
    WriteConfig {
        /// Configuration path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Delivering a signal failed.
    #[error("failed to signal daemon pid {pid}: {source}")]
    SignalFailed {
        /// Target process.
        pid: u32,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The process identifier cannot be signalled.
    #[error("invalid daemon pid {pid}")]
    InvalidPid {
        /// Rejected process identifier.
        pid: u32,
    },
    /// Forced termination failed.
    #[error("failed to kill daemon pid {pid}: {source}")]
    KillFailed {
        /// Target process.
        pid: u32,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
