//! Stand-in log daemon for end-to-end tests of `logrig`.
//!
//! `logrig-stubd` accepts the command line the process controller builds,
//! reads the configuration subset `logrig` renders, and routes messages
//! between file, wildcard-file, network, program and internal statements.
//! It prints the same readiness and reload lines as the real daemon so the
//! controller's lifecycle handling can be exercised without installing one.
//!
//! - [`grammar`] parses configuration text.
//! - [`routing`] owns the live source and destination handles.
//! - [`run_daemon`] is the signal-driven main loop.
//! - [`fixtures`] prepares harness settings pointing at the stub.

mod cli;
mod daemon;
pub mod fixtures;
pub mod grammar;
pub mod routing;

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use logrig::telemetry;
use logrig_config::HarnessSettings;

pub use daemon::{
    READY_MARKER, RELOAD_MARKER, SHUTDOWN_MARKER, StubError, StubOptions, run_daemon,
};

/// Parses `args`, installs telemetry and runs the daemon to completion.
pub fn run<I, T>(args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let parsed = match cli::StubArgs::try_parse_from(args) {
        Ok(parsed) => parsed,
        Err(error) => error.exit(),
    };
    let settings = HarnessSettings {
        log_filter: Some(parsed.log_filter.clone()),
        ..HarnessSettings::default()
    };
    if let Err(error) = telemetry::initialise(&settings) {
        report(&format!("logrig-stubd: {error}"));
        return ExitCode::FAILURE;
    }
    let mut stdout = io::stdout().lock();
    match run_daemon(&parsed.options(), &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report(&error.to_string());
            ExitCode::FAILURE
        }
    }
}

fn report(line: &str) {
    // stderr is the daemon console; a failed write has no other outlet.
    writeln!(io::stderr().lock(), "{line}").unwrap_or_default();
}
