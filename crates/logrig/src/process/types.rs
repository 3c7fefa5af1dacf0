//! Lifecycle state, command line and marker types.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use logrig_config::HarnessSettings;

use crate::context::TestContext;

/// Lifecycle state of the daemon under test.
///
/// `Failed` is absorbing: once entered, only [`stop`] may still run, to reap
/// any leftover process.
///
/// [`stop`]: super::ProcessController::stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// No process is running.
    Stopped,
    /// Launched, waiting for the readiness marker.
    Starting,
    /// Ready and processing messages.
    Running,
    /// Signalled to reload, waiting for the reload marker.
    Reloading,
    /// Signalled to terminate, waiting for exit.
    Stopping,
    /// A transition failed.
    Failed,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Reloading => "reloading",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        };
        formatter.write_str(label)
    }
}

/// How a call to `stop` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The daemon exited within the grace period.
    Graceful {
        /// Exit code, when the daemon exited normally.
        exit_status: Option<i32>,
    },
    /// The daemon ignored termination and was killed.
    Killed,
    /// There was no process to stop.
    NotRunning,
}

/// Console markers the controller waits for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonProfile {
    /// Text printed once the daemon is ready.
    pub ready_marker: String,
    /// Text printed once a reload completed.
    pub reload_marker: String,
}

impl Default for DaemonProfile {
    fn default() -> Self {
        Self {
            ready_marker: "syslog-ng starting up".to_owned(),
            reload_marker: "Configuration reload finished".to_owned(),
        }
    }
}

/// Command line handed to the daemon binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonCommand {
    /// Executable to launch.
    pub binary: OsString,
    /// Configuration file.
    pub config_path: PathBuf,
    /// Persist file.
    pub persist_path: PathBuf,
    /// Pid file.
    pub pid_path: PathBuf,
    /// Control socket.
    pub control_path: PathBuf,
    /// Arguments appended after the standard ones.
    pub extra_args: Vec<OsString>,
}

impl DaemonCommand {
    /// Command for the run described by `context`.
    #[must_use]
    pub fn for_context(context: &TestContext) -> Self {
        Self {
            binary: OsString::from(context.settings().daemon_binary()),
            config_path: context.config_path(),
            persist_path: context.persist_path(),
            pid_path: context.pid_path(),
            control_path: context.control_path(),
            extra_args: Vec::new(),
        }
    }

    /// Full argument vector, excluding the binary.
    #[must_use]
    pub fn arguments(&self) -> Vec<OsString> {
        let mut arguments = vec![OsString::from("--foreground")];
        for (flag, path) in [
            ("--cfgfile=", &self.config_path),
            ("--persist-file=", &self.persist_path),
            ("--pidfile=", &self.pid_path),
            ("--control=", &self.control_path),
        ] {
            let mut argument = OsString::from(flag);
            argument.push(path.as_os_str());
            arguments.push(argument);
        }
        arguments.push(OsString::from("--stderr"));
        arguments.push(OsString::from("--no-caps"));
        arguments.extend(self.extra_args.iter().cloned());
        arguments
    }
}

/// Bounded waits applied by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerTiming {
    /// Wait for the readiness marker.
    pub startup_timeout: Duration,
    /// Wait for the reload marker.
    pub reload_timeout: Duration,
    /// Wait for a graceful exit before killing.
    pub stop_grace: Duration,
    /// Sleep between polls.
    pub poll_interval: Duration,
}

impl From<&HarnessSettings> for ControllerTiming {
    fn from(settings: &HarnessSettings) -> Self {
        Self {
            startup_timeout: settings.startup_timeout(),
            reload_timeout: settings.reload_timeout(),
            stop_grace: settings.stop_grace(),
            poll_interval: settings.poll_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_follow_the_daemon_conventions() {
        let command = DaemonCommand {
            binary: OsString::from("syslog-ng"),
            config_path: PathBuf::from("/run/a.conf"),
            persist_path: PathBuf::from("/run/a.persist"),
            pid_path: PathBuf::from("/run/a.pid"),
            control_path: PathBuf::from("/run/a.ctl"),
            extra_args: vec![OsString::from("-v")],
        };
        let arguments: Vec<String> = command
            .arguments()
            .into_iter()
            .map(|argument| argument.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            arguments,
            vec![
                "--foreground",
                "--cfgfile=/run/a.conf",
                "--persist-file=/run/a.persist",
                "--pidfile=/run/a.pid",
                "--control=/run/a.ctl",
                "--stderr",
                "--no-caps",
                "-v",
            ]
        );
    }

    #[test]
    fn states_display_in_lower_case() {
        assert_eq!(DaemonState::Reloading.to_string(), "reloading");
        assert_eq!(DaemonState::Failed.to_string(), "failed");
    }
}
