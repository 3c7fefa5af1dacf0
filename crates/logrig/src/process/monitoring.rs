//! Console monitoring for readiness and reload markers.
//!
//! The daemon's stdout and stderr go to a console log in the run directory.
//! Waits remember the log length before acting and only look for markers
//! written after that offset, so a marker from an earlier start or reload is
//! never mistaken for a fresh one.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

use cap_std::fs::Dir;

use super::error::LifecycleError;

/// Read access to the daemon console log.
#[derive(Debug)]
pub(crate) struct ConsoleLog {
    dir: Dir,
    file_name: String,
    path: PathBuf,
}

impl ConsoleLog {
    /// Opens the directory holding `path`.
    pub(crate) fn open(path: &Path) -> Result<Self, LifecycleError> {
        let not_found = || LifecycleError::ReadConsole {
            path: path.to_path_buf(),
            source: io::Error::from(io::ErrorKind::InvalidInput),
        };
        let parent = path.parent().ok_or_else(not_found)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(not_found)?
            .to_owned();
        let dir = Dir::open_ambient_dir(parent, cap_std::ambient_authority()).map_err(
            |source| LifecycleError::ReadConsole {
                path: path.to_path_buf(),
                source,
            },
        )?;
        Ok(Self {
            dir,
            file_name,
            path: path.to_path_buf(),
        })
    }

    /// Full path of the console log.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<u8>, LifecycleError> {
        match self.dir.read(&self.file_name) {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(LifecycleError::ReadConsole {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Current length of the log; zero when it does not exist yet.
    pub(crate) fn len(&self) -> Result<u64, LifecycleError> {
        Ok(self.read_all()?.len() as u64)
    }

    /// Text written at or after `offset`.
    pub(crate) fn since(&self, offset: u64) -> Result<String, LifecycleError> {
        let bytes = self.read_all()?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
        let tail = bytes.get(start..).unwrap_or_default();
        Ok(String::from_utf8_lossy(tail).into_owned())
    }
}

/// Result of waiting for a console marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MarkerOutcome {
    /// The marker appeared after the offset.
    Seen,
    /// The process exited first.
    Exited {
        /// Exit code, when the process exited normally.
        exit_status: Option<i32>,
    },
    /// The deadline passed.
    TimedOut,
}

/// Bounded wait for `marker` to appear in the console after `offset`.
///
/// The child is checked before the console on every poll, so a daemon that
/// exits is reported as exited even if it printed the marker first.
pub(crate) fn wait_for_marker(
    child: &mut Child,
    console: &ConsoleLog,
    offset: u64,
    marker: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<MarkerOutcome, LifecycleError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|source| LifecycleError::MonitorChild { source })?
        {
            return Ok(MarkerOutcome::Exited {
                exit_status: status.code(),
            });
        }
        if console.since(offset)?.contains(marker) {
            return Ok(MarkerOutcome::Seen);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(MarkerOutcome::TimedOut);
        }
        thread::sleep(poll_interval.min(deadline - now));
    }
}
