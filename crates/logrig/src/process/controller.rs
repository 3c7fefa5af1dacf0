//! State machine driving the daemon process.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Child;

use tracing::{error, info, warn};

use super::PROCESS_TARGET;
use super::error::LifecycleError;
use super::monitoring::{ConsoleLog, MarkerOutcome, wait_for_marker};
use super::shutdown::{DaemonSignal, DaemonSignaller, SystemSignaller, kill_child, wait_for_exit};
use super::spawning::spawn_daemon;
use super::types::{ControllerTiming, DaemonCommand, DaemonProfile, DaemonState, StopOutcome};
use crate::context::TestContext;

/// Drives one daemon process through start, reload and stop.
///
/// Every transition is a single bounded wait; nothing keeps polling after a
/// call returns. A failed transition moves the controller to
/// [`DaemonState::Failed`] and kills any process it left behind.
pub struct ProcessController {
    command: DaemonCommand,
    console_path: PathBuf,
    profile: DaemonProfile,
    timing: ControllerTiming,
    signaller: Box<dyn DaemonSignaller>,
    state: DaemonState,
    child: Option<Child>,
}

impl fmt::Debug for ProcessController {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ProcessController")
            .field("command", &self.command)
            .field("state", &self.state)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

impl ProcessController {
    /// Controller for the run described by `context`.
    #[must_use]
    pub fn new(context: &TestContext) -> Self {
        Self {
            command: DaemonCommand::for_context(context),
            console_path: context.console_path(),
            profile: DaemonProfile::default(),
            timing: ControllerTiming::from(context.settings()),
            signaller: Box::new(SystemSignaller),
            state: DaemonState::Stopped,
            child: None,
        }
    }

    /// Replaces the signal delivery mechanism.
    #[must_use]
    pub fn with_signaller(mut self, signaller: Box<dyn DaemonSignaller>) -> Self {
        self.signaller = signaller;
        self
    }

    /// Replaces the console markers.
    #[must_use]
    pub fn with_profile(mut self, profile: DaemonProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Replaces the bounded waits.
    #[must_use]
    pub fn with_timing(mut self, timing: ControllerTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Appends arguments to the daemon command line.
    #[must_use]
    pub fn with_extra_args<I, A>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.command
            .extra_args
            .extend(arguments.into_iter().map(Into::into));
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> DaemonState {
        self.state
    }

    /// Bounded waits in effect.
    #[must_use]
    pub const fn timing(&self) -> ControllerTiming {
        self.timing
    }

    /// Process identifier of the running daemon.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Command line used to launch the daemon.
    #[must_use]
    pub const fn command(&self) -> &DaemonCommand {
        &self.command
    }

    /// Console log capturing the daemon's output.
    #[must_use]
    pub fn console_path(&self) -> &Path {
        &self.console_path
    }

    /// Writes `config_text`, launches the daemon and waits for readiness.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidState`] unless stopped, and
    /// [`LifecycleError::StartupTimeout`], [`LifecycleError::StartupFailed`]
    /// or a launch error otherwise; each of those leaves the controller
    /// failed.
    pub fn start(&mut self, config_text: &str) -> Result<(), LifecycleError> {
        self.require(DaemonState::Stopped, "start")?;
        self.transition(DaemonState::Starting);
        match self.launch(config_text) {
            Ok(()) => {
                self.transition(DaemonState::Running);
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    fn launch(&mut self, config_text: &str) -> Result<(), LifecycleError> {
        self.write_config(config_text)?;
        let console = ConsoleLog::open(&self.console_path)?;
        let offset = console.len()?;
        let child = self.child.insert(spawn_daemon(&self.command, &self.console_path)?);
        info!(
            target: PROCESS_TARGET,
            pid = child.id(),
            binary = ?self.command.binary,
            config = %self.command.config_path.display(),
            "spawned daemon"
        );
        let outcome = wait_for_marker(
            child,
            &console,
            offset,
            &self.profile.ready_marker,
            self.timing.startup_timeout,
            self.timing.poll_interval,
        )?;
        match outcome {
            MarkerOutcome::Seen => Ok(()),
            MarkerOutcome::Exited { exit_status } => Err(LifecycleError::StartupFailed {
                exit_status,
                console: console.path().to_path_buf(),
            }),
            MarkerOutcome::TimedOut => Err(LifecycleError::StartupTimeout {
                marker: self.profile.ready_marker.clone(),
                console: console.path().to_path_buf(),
                timeout_ms: millis(self.timing.startup_timeout),
            }),
        }
    }

    /// Asks the running daemon to re-read its configuration in place.
    ///
    /// Transport handles are untouched; endpoints whose parameters did not
    /// change keep working once the reload is acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidState`] without signalling anything
    /// unless running. [`LifecycleError::ReloadTimeout`],
    /// [`LifecycleError::ReloadFailed`] and signalling errors leave the
    /// controller failed.
    pub fn reload(&mut self) -> Result<(), LifecycleError> {
        self.require(DaemonState::Running, "reload")?;
        self.transition(DaemonState::Reloading);
        match self.signal_reload() {
            Ok(()) => {
                self.transition(DaemonState::Running);
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Writes `config_text` over the configuration file, then reloads.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidState`] unless running,
    /// [`LifecycleError::WriteConfig`] when the file cannot be written, and
    /// any error of [`ProcessController::reload`].
    pub fn reload_with(&mut self, config_text: &str) -> Result<(), LifecycleError> {
        self.require(DaemonState::Running, "reload")?;
        self.write_config(config_text)?;
        self.reload()
    }

    fn signal_reload(&mut self) -> Result<(), LifecycleError> {
        let console = ConsoleLog::open(&self.console_path)?;
        let offset = console.len()?;
        let Some(child) = self.child.as_mut() else {
            return Err(LifecycleError::InvalidState {
                operation: "reload",
                state: self.state,
            });
        };
        let pid = child.id();
        self.signaller.send(pid, DaemonSignal::Reload)?;
        info!(target: PROCESS_TARGET, pid, "requested configuration reload");
        let outcome = wait_for_marker(
            child,
            &console,
            offset,
            &self.profile.reload_marker,
            self.timing.reload_timeout,
            self.timing.poll_interval,
        )?;
        match outcome {
            MarkerOutcome::Seen => Ok(()),
            MarkerOutcome::Exited { exit_status } => Err(LifecycleError::ReloadFailed {
                exit_status,
                console: console.path().to_path_buf(),
            }),
            MarkerOutcome::TimedOut => Err(LifecycleError::ReloadTimeout {
                marker: self.profile.reload_marker.clone(),
                console: console.path().to_path_buf(),
                timeout_ms: millis(self.timing.reload_timeout),
            }),
        }
    }

    /// Requests graceful termination, killing the daemon after the grace
    /// period.
    ///
    /// A failed controller stays failed but its leftover process is reaped.
    ///
    /// # Errors
    ///
    /// Returns signalling, monitoring or kill errors; the controller is then
    /// failed.
    pub fn stop(&mut self) -> Result<StopOutcome, LifecycleError> {
        let failed = self.state == DaemonState::Failed;
        let Some(mut child) = self.child.take() else {
            if !failed {
                self.transition(DaemonState::Stopped);
            }
            return Ok(StopOutcome::NotRunning);
        };
        if !failed {
            self.transition(DaemonState::Stopping);
        }
        match self.terminate(&mut child) {
            Ok(outcome) => {
                info!(target: PROCESS_TARGET, pid = child.id(), ?outcome, "daemon stopped");
                if !failed {
                    self.transition(DaemonState::Stopped);
                }
                Ok(outcome)
            }
            Err(error) => {
                self.child = Some(child);
                Err(self.fail(error))
            }
        }
    }

    fn terminate(&self, child: &mut Child) -> Result<StopOutcome, LifecycleError> {
        let pid = child.id();
        self.signaller.send(pid, DaemonSignal::Terminate)?;
        if let Some(status) = wait_for_exit(child, self.timing.stop_grace, self.timing.poll_interval)?
        {
            return Ok(StopOutcome::Graceful {
                exit_status: status.code(),
            });
        }
        warn!(
            target: PROCESS_TARGET,
            pid,
            grace_ms = millis(self.timing.stop_grace),
            "daemon ignored termination; killing"
        );
        kill_child(child)?;
        Ok(StopOutcome::Killed)
    }

    fn require(&self, expected: DaemonState, operation: &'static str) -> Result<(), LifecycleError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(LifecycleError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, next: DaemonState) {
        info!(
            target: PROCESS_TARGET,
            from = %self.state,
            to = %next,
            "daemon state changed"
        );
        self.state = next;
    }

    fn fail(&mut self, cause: LifecycleError) -> LifecycleError {
        error!(target: PROCESS_TARGET, from = %self.state, error = %cause, "daemon transition failed");
        self.state = DaemonState::Failed;
        self.reap();
        cause
    }

    fn reap(&mut self) {
        if let Some(mut child) = self.child.take()
            && let Err(reap_error) = kill_child(&mut child)
        {
            warn!(target: PROCESS_TARGET, pid = child.id(), error = %reap_error, "failed to reap daemon");
        }
    }

    fn write_config(&self, config_text: &str) -> Result<(), LifecycleError> {
        let path = &self.command.config_path;
        fs::write(path, config_text).map_err(|source| LifecycleError::WriteConfig {
            path: path.clone(),
            source,
        })
    }
}

impl Drop for ProcessController {
    fn drop(&mut self) {
        self.reap();
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
