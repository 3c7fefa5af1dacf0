//! Harness settings shared by the `logrig` crates.
//!
//! Settings are layered by `ortho_config`: built-in defaults, an optional
//! `.logrig.toml` file, `LOGRIG_*` environment variables, then command-line
//! flags. Every field is optional so each layer only needs to name what it
//! overrides; the accessor methods resolve the effective value.

mod defaults;
mod logging;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DAEMON_BINARY_ENV_VAR, DEFAULT_CONFIG_VERSION, DEFAULT_DAEMON_BINARY, DEFAULT_LOG_FILTER,
    DEFAULT_POLL_INTERVAL, DEFAULT_RECEIVE_TIMEOUT, DEFAULT_RELOAD_TIMEOUT,
    DEFAULT_STARTUP_TIMEOUT, DEFAULT_STOP_GRACE, default_daemon_binary, default_log_filter,
    default_log_format, default_work_root,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Settings controlling how the harness drives the daemon under test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "LOGRIG")]
pub struct HarnessSettings {
    /// Daemon executable to launch.
    pub daemon_binary: Option<String>,
    /// Value of the rendered `@version:` header.
    pub config_version: Option<String>,
    /// Startup wait in milliseconds.
    pub startup_timeout_ms: Option<u64>,
    /// Reload wait in milliseconds.
    pub reload_timeout_ms: Option<u64>,
    /// Grace period before forced termination, in milliseconds.
    pub stop_grace_ms: Option<u64>,
    /// Poll cadence in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Default listener wait in milliseconds.
    pub receive_timeout_ms: Option<u64>,
    /// Parent directory for per-run directories.
    pub work_root: Option<Utf8PathBuf>,
    /// Keep run directories after teardown.
    pub keep_artefacts: Option<bool>,
    /// Tracing filter expression.
    pub log_filter: Option<String>,
    /// Tracing output format.
    pub log_format: Option<LogFormat>,
}

impl HarnessSettings {
    /// Daemon executable to launch.
    pub fn daemon_binary(&self) -> String {
        self.daemon_binary
            .clone()
            .unwrap_or_else(default_daemon_binary)
    }

    /// Version string written to the configuration header.
    pub fn config_version(&self) -> &str {
        self.config_version
            .as_deref()
            .unwrap_or(DEFAULT_CONFIG_VERSION)
    }

    /// Bounded wait for daemon readiness.
    pub fn startup_timeout(&self) -> Duration {
        millis_or(self.startup_timeout_ms, DEFAULT_STARTUP_TIMEOUT)
    }

    /// Bounded wait for reload acknowledgement.
    pub fn reload_timeout(&self) -> Duration {
        millis_or(self.reload_timeout_ms, DEFAULT_RELOAD_TIMEOUT)
    }

    /// Grace period granted to a terminating daemon.
    pub fn stop_grace(&self) -> Duration {
        millis_or(self.stop_grace_ms, DEFAULT_STOP_GRACE)
    }

    /// Poll cadence for every bounded wait.
    pub fn poll_interval(&self) -> Duration {
        millis_or(self.poll_interval_ms, DEFAULT_POLL_INTERVAL)
    }

    /// Default wait applied by listeners.
    pub fn receive_timeout(&self) -> Duration {
        millis_or(self.receive_timeout_ms, DEFAULT_RECEIVE_TIMEOUT)
    }

    /// Parent directory for per-run directories.
    pub fn work_root(&self) -> Utf8PathBuf {
        self.work_root.clone().unwrap_or_else(default_work_root)
    }

    /// Whether run directories survive teardown.
    pub fn keep_artefacts(&self) -> bool {
        self.keep_artefacts.unwrap_or(false)
    }

    /// Tracing filter expression.
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Tracing output format.
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Rejects combinations that would make bounded waits meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::ZeroDuration`] when a timeout or the poll
    /// interval is zero, and [`SettingsError::RelativeWorkRoot`] when the work
    /// root is not absolute.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let durations = [
            ("startup_timeout_ms", self.startup_timeout()),
            ("reload_timeout_ms", self.reload_timeout()),
            ("poll_interval_ms", self.poll_interval()),
            ("receive_timeout_ms", self.receive_timeout()),
        ];
        if let Some(&(field, _)) = durations.iter().find(|(_, value)| value.is_zero()) {
            return Err(SettingsError::ZeroDuration { field });
        }
        let root = self.work_root();
        if !root.is_absolute() {
            return Err(SettingsError::RelativeWorkRoot { path: root });
        }
        Ok(())
    }

    /// Returns a copy pointing the daemon binary at `binary`.
    #[must_use]
    pub fn with_daemon_binary(mut self, binary: impl Into<String>) -> Self {
        self.daemon_binary = Some(binary.into());
        self
    }

    /// Returns a copy rooted at `root`.
    #[must_use]
    pub fn with_work_root(mut self, root: impl AsRef<Utf8Path>) -> Self {
        self.work_root = Some(root.as_ref().to_path_buf());
        self
    }
}

fn millis_or(value: Option<u64>, fallback: Duration) -> Duration {
    value.map_or(fallback, Duration::from_millis)
}

/// Errors raised by [`HarnessSettings::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// A duration setting was zero.
    #[error("setting '{field}' must be greater than zero")]
    ZeroDuration {
        /// Name of the offending setting.
        field: &'static str,
    },
    /// The work root was a relative path.
    #[error("work root '{path}' must be an absolute path")]
    RelativeWorkRoot {
        /// Configured work root.
        path: Utf8PathBuf,
    },
}
