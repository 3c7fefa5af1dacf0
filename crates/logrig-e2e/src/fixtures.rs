//! Shared set-up for tests driving `logrig-stubd` through `logrig`.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use logrig::{HarnessError, Testcase};
use logrig_config::HarnessSettings;
use tempfile::TempDir;

/// Message used by the message-flow scenarios.
pub const MESSAGE: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Temporary work root plus settings that launch a given daemon binary.
///
/// Drop every [`Testcase`] created from a harness before the harness itself,
/// so the daemon is gone before its work root is removed.
#[derive(Debug)]
pub struct StubHarness {
    settings: HarnessSettings,
    work_root: Utf8PathBuf,
    _root: TempDir,
}

impl StubHarness {
    /// Creates a work root and settings for `binary` with short waits.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the temporary directory cannot be created or
    /// its path is not UTF-8.
    pub fn new(binary: impl Into<String>) -> io::Result<Self> {
        let root = tempfile::tempdir()?;
        let work_root = Utf8PathBuf::from_path_buf(root.path().to_path_buf())
            .map_err(|path| io::Error::other(format!("work root {path:?} is not UTF-8")))?;
        let settings = HarnessSettings {
            startup_timeout_ms: Some(5_000),
            reload_timeout_ms: Some(5_000),
            stop_grace_ms: Some(2_000),
            poll_interval_ms: Some(10),
            receive_timeout_ms: Some(3_000),
            ..HarnessSettings::default()
        }
        .with_daemon_binary(binary)
        .with_work_root(&work_root);
        Ok(Self {
            settings,
            work_root,
            _root: root,
        })
    }

    /// Applies `adjust` to the settings used for later testcases.
    #[must_use]
    pub fn with_settings(mut self, adjust: impl FnOnce(&mut HarnessSettings)) -> Self {
        adjust(&mut self.settings);
        self
    }

    /// Settings handed to every testcase.
    #[must_use]
    pub const fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Directory holding the per-run directories.
    #[must_use]
    pub fn work_root(&self) -> &Utf8Path {
        &self.work_root
    }

    /// Prepares a fresh testcase under the work root.
    ///
    /// # Errors
    ///
    /// Propagates [`HarnessError`] from [`Testcase::new`].
    pub fn testcase(&self) -> Result<Testcase, HarnessError> {
        Testcase::new(self.settings.clone())
    }
}
