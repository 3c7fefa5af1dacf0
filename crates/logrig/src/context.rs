//! Test-scoped state shared by every harness operation.
//!
//! A [`TestContext`] is created at test set-up, passed explicitly to the
//! operations that need run-scoped resources, and dropped at teardown. Nothing
//! in it is global, so parallel tests never observe each other's state.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use logrig_config::{HarnessSettings, SettingsError};
use tempfile::TempDir;
use thiserror::Error;
use tracing::info;

use crate::paths::{PortAllocator, PortError, UniquePathRegistry};

const CONTEXT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::context");
const RUN_DIR_PREFIX: &str = "logrig-run-";

/// Errors raised while preparing or using a test context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Settings failed validation.
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// The work root could not be created.
    #[error("failed to create work root {path:?}: {source}")]
    CreateWorkRoot {
        /// Work root path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The per-run directory could not be created.
    #[error("failed to create run directory under {root:?}: {source}")]
    CreateRunDir {
        /// Parent directory.
        root: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A network port could not be reserved.
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Run-scoped resources for one test.
#[derive(Debug)]
pub struct TestContext {
    settings: HarnessSettings,
    run_dir: TempDir,
    paths: UniquePathRegistry,
    ports: PortAllocator,
}

impl TestContext {
    /// Validates `settings` and creates a fresh run directory.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when settings are invalid or the run directory
    /// cannot be created.
    pub fn new(settings: HarnessSettings) -> Result<Self, ContextError> {
        settings.validate()?;
        let root = settings.work_root().into_std_path_buf();
        fs::create_dir_all(&root).map_err(|source| ContextError::CreateWorkRoot {
            path: root.clone(),
            source,
        })?;
        let run_dir = tempfile::Builder::new()
            .prefix(RUN_DIR_PREFIX)
            .keep(settings.keep_artefacts())
            .tempdir_in(&root)
            .map_err(|source| ContextError::CreateRunDir {
                root: root.clone(),
                source,
            })?;
        info!(
            target: CONTEXT_TARGET,
            run_dir = %run_dir.path().display(),
            keep = settings.keep_artefacts(),
            "created run directory"
        );
        let paths = UniquePathRegistry::new(run_dir.path());
        Ok(Self {
            settings,
            run_dir,
            paths,
            ports: PortAllocator::new(),
        })
    }

    /// Effective harness settings.
    #[must_use]
    pub const fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Directory holding every artefact of this run.
    #[must_use]
    pub fn run_dir(&self) -> &Path {
        self.run_dir.path()
    }

    /// Configuration file read by the daemon.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.run_dir().join("logrig.conf")
    }

    /// Persist file handed to the daemon.
    #[must_use]
    pub fn persist_path(&self) -> PathBuf {
        self.run_dir().join("logrig.persist")
    }

    /// Pid file written by the daemon.
    #[must_use]
    pub fn pid_path(&self) -> PathBuf {
        self.run_dir().join("logrig.pid")
    }

    /// Control socket path handed to the daemon.
    #[must_use]
    pub fn control_path(&self) -> PathBuf {
        self.run_dir().join("logrig.ctl")
    }

    /// File capturing the daemon's stdout and stderr.
    #[must_use]
    pub fn console_path(&self) -> PathBuf {
        self.run_dir().join("daemon-console.log")
    }

    /// Path registry scoped to this run.
    pub const fn paths_mut(&mut self) -> &mut UniquePathRegistry {
        &mut self.paths
    }

    /// Path registry scoped to this run.
    #[must_use]
    pub const fn paths(&self) -> &UniquePathRegistry {
        &self.paths
    }

    /// Shorthand for [`UniquePathRegistry::get_registered_file_path`].
    pub fn get_registered_file_path(&mut self, prefix: &str) -> PathBuf {
        self.paths.get_registered_file_path(prefix)
    }

    /// Reserves a loopback port for this run.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Port`] when no port can be reserved.
    pub fn allocate_port(&mut self) -> Result<u16, ContextError> {
        Ok(self.ports.allocate()?)
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn work_root() -> TempDir {
        tempfile::tempdir().expect("work root")
    }

    fn settings_in(root: &TempDir, keep: bool) -> HarnessSettings {
        let root = Utf8PathBuf::from_path_buf(root.path().to_path_buf()).expect("utf8 path");
        HarnessSettings {
            keep_artefacts: Some(keep),
            ..HarnessSettings::default()
        }
        .with_work_root(root)
    }

    #[rstest]
    fn run_directories_are_distinct(work_root: TempDir) {
        let first = TestContext::new(settings_in(&work_root, false)).expect("first context");
        let second = TestContext::new(settings_in(&work_root, false)).expect("second context");
        assert_ne!(first.run_dir(), second.run_dir());
        assert!(first.config_path().starts_with(first.run_dir()));
    }

    #[rstest]
    fn run_directory_is_removed_on_drop(work_root: TempDir) {
        let context = TestContext::new(settings_in(&work_root, false)).expect("context");
        let run_dir = context.run_dir().to_path_buf();
        drop(context);
        assert!(!run_dir.exists());
    }

    #[rstest]
    fn kept_artefacts_survive_drop(work_root: TempDir) {
        let context = TestContext::new(settings_in(&work_root, true)).expect("context");
        let run_dir = context.run_dir().to_path_buf();
        drop(context);
        assert!(run_dir.exists());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let settings = HarnessSettings {
            poll_interval_ms: Some(0),
            ..HarnessSettings::default()
        };
        let error = TestContext::new(settings).expect_err("zero poll interval");
        assert!(matches!(error, ContextError::Settings(_)));
    }
}
