//! Functional-test orchestration for a syslog-style log daemon.
//!
//! A test builds a [`ConfigModel`] of sources, destinations and log paths,
//! renders it to configuration text, and drives the daemon through a
//! [`ProcessController`]. Each declared statement comes back with a
//! [`DriverProperty`] holding a live transport: a writer for sources and a
//! listener for destinations. Those handles belong to the test, not the
//! model, so they keep working across regenerations and reloads.
//!
//! Run-scoped resources (unique file paths, free ports, the run directory)
//! live in a [`TestContext`] that is passed explicitly to the operations that
//! need them. Nothing is global apart from the tracing subscriber installed by
//! [`telemetry::initialise`].
//!
//! [`Testcase`] bundles the three pieces for the common case:
//!
//! 1. declare statements with [`Testcase::create_source`] and
//!    [`Testcase::create_destination`];
//! 2. connect them with [`ConfigModel::connect_statements_in_logpath`];
//! 3. [`Testcase::start`] the daemon, write through the source writers and
//!    read back through the destination listeners;
//! 4. mutate the graph and [`Testcase::reload`].

mod context;
mod drivers;
mod error;
mod ids;
mod model;
mod options;
mod paths;
mod process;
mod render;
pub mod telemetry;
mod testcase;
mod transport;

pub use context::{ContextError, TestContext};
pub use drivers::{
    DriverCatalog, DriverSchema, EndpointRule, LOOPBACK, MandatoryOption, ResolvedOptions,
    ValueGenerator, program_command,
};
pub use error::{ConfigError, HarnessError};
pub use ids::{IdentifierAllocator, LogPathId, StatementId, StatementKind};
pub use model::{ConfigModel, DriverProperty, GenerateOptions, LogPath, Statement};
pub use options::{OptionMap, OptionValue};
pub use paths::{PortAllocator, PortError, UniquePathRegistry};
pub use process::{
    ControllerTiming, DaemonCommand, DaemonProfile, DaemonSignal, DaemonSignaller, DaemonState,
    LifecycleError, ProcessController, StopOutcome, SystemSignaller,
};
pub use render::{
    ConfigRenderer, INTERNAL_DESTINATION_ID, INTERNAL_SOURCE_ID, RenderFlags, RenderMode, Snapshot,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use testcase::Testcase;
pub use transport::{
    Endpoint, FileListener, FileWriter, Listener, ListenerTiming, ListenerTransport,
    NetworkTransport, TcpListenerTransport, TcpWriter, TransportBinding, TransportError,
    UdpListenerTransport, UdpWriter, Writer, WriterTransport, bind,
};

#[cfg(test)]
mod tests;
