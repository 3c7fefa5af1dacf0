use std::env;
use std::time::Duration;

use camino::Utf8PathBuf;

/// Daemon executable launched when nothing else is configured.
pub const DEFAULT_DAEMON_BINARY: &str = "syslog-ng";

/// Environment variable consulted before falling back to
/// [`DEFAULT_DAEMON_BINARY`].
pub const DAEMON_BINARY_ENV_VAR: &str = "LOGRIG_DAEMON_BINARY";

/// Value written to the `@version:` header of rendered configurations.
pub const DEFAULT_CONFIG_VERSION: &str = "4.0";

/// Bounded wait for the daemon to report a successful start.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded wait for the daemon to acknowledge a reload.
pub const DEFAULT_RELOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period between the termination request and a forced kill.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Cadence of every bounded poll loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default bounded wait applied by destination listeners.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default tracing filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the harness.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the harness.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Compact
}

/// Resolves the daemon binary from the environment or the built-in default.
pub fn default_daemon_binary() -> String {
    env::var(DAEMON_BINARY_ENV_VAR).unwrap_or_else(|_| DEFAULT_DAEMON_BINARY.to_owned())
}

/// Directory under which per-run directories are created.
pub fn default_work_root() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
