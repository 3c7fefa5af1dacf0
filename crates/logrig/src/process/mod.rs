//! Lifecycle management for the daemon under test.
//!
//! This module is split into focused submodules:
//! - [`types`] defines states, outcomes, markers and the command line.
//! - [`error`] captures the lifecycle error surface.
//! - [`spawning`] launches the daemon with its console redirected.
//! - [`monitoring`] watches the console for readiness and reload markers.
//! - [`shutdown`] delivers signals and escalates termination.
//! - [`controller`] implements the start/reload/stop state machine.

mod controller;
mod error;
mod monitoring;
mod shutdown;
mod spawning;
mod types;

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

pub use controller::ProcessController;
pub use error::LifecycleError;
pub use shutdown::{DaemonSignal, DaemonSignaller, SystemSignaller};
pub use types::{ControllerTiming, DaemonCommand, DaemonProfile, DaemonState, StopOutcome};
