//! Command-line arguments of `logrig-stubd`.
//!
//! The flags mirror the daemon command line the process controller builds,
//! plus a few switches used to provoke lifecycle failures.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::daemon::StubOptions;

/// Stand-in log daemon for `logrig` end-to-end tests.
#[derive(Parser, Debug)]
#[command(name = "logrig-stubd")]
pub(crate) struct StubArgs {
    /// Stay in the foreground (always the case).
    #[arg(long, short = 'F')]
    pub(crate) foreground: bool,
    /// Configuration file to load.
    #[arg(long, short = 'f', value_name = "PATH")]
    pub(crate) cfgfile: PathBuf,
    /// Persist file (accepted, unused).
    #[arg(long = "persist-file", short = 'R', value_name = "PATH")]
    pub(crate) persist_file: Option<PathBuf>,
    /// Pid file written while running.
    #[arg(long, short = 'p', value_name = "PATH")]
    pub(crate) pidfile: Option<PathBuf>,
    /// Control socket (accepted, unused).
    #[arg(long, short = 'c', value_name = "PATH")]
    pub(crate) control: Option<PathBuf>,
    /// Log to stderr (always the case).
    #[arg(long)]
    pub(crate) stderr: bool,
    /// Do not drop capabilities (accepted, unused).
    #[arg(long = "no-caps")]
    pub(crate) no_caps: bool,
    /// Keep running when SIGTERM or SIGINT arrives.
    #[arg(long)]
    pub(crate) ignore_sigterm: bool,
    /// Delay before announcing readiness, in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub(crate) ready_delay_ms: u64,
    /// Sleep between routing passes, in milliseconds.
    #[arg(long, default_value_t = 10)]
    pub(crate) poll_interval_ms: u64,
    /// Tracing filter for the daemon's own diagnostics.
    #[arg(long, default_value = "info")]
    pub(crate) log_filter: String,
}

impl StubArgs {
    pub(crate) fn options(&self) -> StubOptions {
        StubOptions {
            config_path: self.cfgfile.clone(),
            pid_path: self.pidfile.clone(),
            ignore_sigterm: self.ignore_sigterm,
            ready_delay: Duration::from_millis(self.ready_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        }
    }
}
