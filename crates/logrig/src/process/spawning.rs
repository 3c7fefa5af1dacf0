//! Daemon process spawning.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use super::error::LifecycleError;
use super::types::DaemonCommand;

/// Spawns the daemon with stdout and stderr appended to `console`.
pub(super) fn spawn_daemon(command: &DaemonCommand, console: &Path) -> Result<Child, LifecycleError> {
    let console_error = |source| LifecycleError::ReadConsole {
        path: console.to_path_buf(),
        source,
    };
    let stdout = OpenOptions::new()
        .create(true)
        .append(true)
        .open(console)
        .map_err(console_error)?;
    let stderr = stdout.try_clone().map_err(console_error)?;
    Command::new(&command.binary)
        .args(command.arguments())
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .spawn()
        .map_err(|source| LifecycleError::LaunchDaemon {
            binary: command.binary.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn missing_binary_reports_launch_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let command = DaemonCommand {
            binary: OsString::from("/nonexistent/logrig/daemon"),
            config_path: PathBuf::from("/unused.conf"),
            persist_path: PathBuf::from("/unused.persist"),
            pid_path: PathBuf::from("/unused.pid"),
            control_path: PathBuf::from("/unused.ctl"),
            extra_args: Vec::new(),
        };
        let error = spawn_daemon(&command, &dir.path().join("console.log"))
            .expect_err("binary does not exist");
        match error {
            LifecycleError::LaunchDaemon { binary, .. } => {
                assert_eq!(binary, OsString::from("/nonexistent/logrig/daemon"));
            }
            other => panic!("expected LaunchDaemon, got: {other:?}"),
        }
    }
}
