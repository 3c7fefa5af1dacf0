//! Main loop of the stand-in daemon.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{info, warn};

use crate::grammar::{self, ParseError, StubConfig};
use crate::routing::{RouteError, Router};

const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::daemon");

/// Console line announcing readiness.
pub const READY_MARKER: &str = "syslog-ng starting up";
/// Console line acknowledging a reload.
pub const RELOAD_MARKER: &str = "Configuration reload finished";
/// Console line printed before exiting.
pub const SHUTDOWN_MARKER: &str = "syslog-ng shutting down";

/// Runtime options of the stand-in daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubOptions {
    /// Configuration file read at start and on every reload.
    pub config_path: PathBuf,
    /// File receiving the process identifier while running.
    pub pid_path: Option<PathBuf>,
    /// Keep running when asked to terminate.
    pub ignore_sigterm: bool,
    /// Delay before announcing readiness.
    pub ready_delay: Duration,
    /// Sleep between routing passes.
    pub poll_interval: Duration,
}

/// Errors that end the daemon.
#[derive(Debug, Error)]
pub enum StubError {
    /// The configuration file could not be read.
    #[error("failed to read configuration {path:?}: {source}")]
    ReadConfig {
        /// Configuration path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The configuration is malformed.
    #[error("error parsing configuration: {0}")]
    Parse(#[from] ParseError),
    /// A statement could not be opened.
    #[error("error initializing configuration: {0}")]
    Route(#[from] RouteError),
    /// Signal handlers could not be installed.
    #[error("failed to install signal handlers: {source}")]
    Signals {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The pid file could not be written.
    #[error("failed to write pid file {path:?}: {source}")]
    PidFile {
        /// Pid file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The console could not be written.
    #[error("failed to write console: {source}")]
    Console {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

fn load(path: &Path) -> Result<StubConfig, StubError> {
    let text = fs::read_to_string(path).map_err(|source| StubError::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(grammar::parse(&text)?)
}

fn announce(console: &mut impl Write, router: &mut Router, line: &str) -> Result<(), StubError> {
    writeln!(console, "{line}")
        .and_then(|()| console.flush())
        .map_err(|source| StubError::Console { source })?;
    router.emit_internal(line);
    Ok(())
}

/// Runs until terminated, announcing state changes on `console`.
///
/// # Errors
///
/// Returns [`StubError`] when start-up fails. Reload failures are reported on
/// the console and the running configuration is kept.
pub fn run_daemon(options: &StubOptions, console: &mut impl Write) -> Result<(), StubError> {
    let mut signals = Signals::new([SIGTERM, SIGINT, SIGHUP])
        .map_err(|source| StubError::Signals { source })?;
    let config = load(&options.config_path)?;
    if !options.ready_delay.is_zero() {
        thread::sleep(options.ready_delay);
    }
    let mut router = Router::build(&config)?;
    if let Some(path) = &options.pid_path {
        fs::write(path, format!("{}\n", std::process::id())).map_err(|source| {
            StubError::PidFile {
                path: path.clone(),
                source,
            }
        })?;
    }
    let version = config.version.as_deref().unwrap_or("unset");
    announce(
        console,
        &mut router,
        &format!("{READY_MARKER}; version='{version}'"),
    )?;
    info!(target: DAEMON_TARGET, config = %options.config_path.display(), "daemon ready");

    'running: loop {
        for signal in signals.pending() {
            match signal {
                SIGHUP => reload(options, console, &mut router)?,
                _ if options.ignore_sigterm => {
                    warn!(target: DAEMON_TARGET, signal, "ignoring termination request");
                }
                _ => break 'running,
            }
        }
        router.pump();
        thread::sleep(options.poll_interval);
    }

    announce(console, &mut router, SHUTDOWN_MARKER)?;
    router.pump();
    if let Some(path) = &options.pid_path {
        if let Err(error) = fs::remove_file(path) {
            warn!(target: DAEMON_TARGET, path = %path.display(), %error, "failed to remove pid file");
        }
    }
    info!(target: DAEMON_TARGET, "daemon stopped");
    Ok(())
}

fn reload(
    options: &StubOptions,
    console: &mut impl Write,
    router: &mut Router,
) -> Result<(), StubError> {
    info!(target: DAEMON_TARGET, "configuration reload requested");
    let outcome = load(&options.config_path)
        .and_then(|config| router.reconfigure(&config).map_err(StubError::from));
    match outcome {
        Ok(()) => announce(console, router, RELOAD_MARKER),
        Err(error) => {
            warn!(target: DAEMON_TARGET, %error, "reload rejected; keeping running configuration");
            writeln!(console, "Error reloading configuration; keeping the running one: {error}")
                .map_err(|source| StubError::Console { source })
        }
    }
}
