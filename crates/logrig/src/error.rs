//! Error types shared across the configuration model and the fixture.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::context::ContextError;
use crate::ids::{LogPathId, StatementId, StatementKind};
use crate::process::LifecycleError;
use crate::transport::TransportError;

/// Configuration-construction and render-time failures.
///
/// These indicate a defect in the test itself and are never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The driver name is not in the catalog.
    #[error("unknown driver '{driver}'")]
    UnknownDriver {
        /// Requested driver name.
        driver: String,
    },
    /// The driver exists but cannot be used for this statement kind.
    #[error("driver '{driver}' cannot be used as a {kind}")]
    UnsupportedKind {
        /// Requested driver name.
        driver: String,
        /// Requested statement kind.
        kind: StatementKind,
    },
    /// An option key the driver's schema does not list.
    #[error("driver '{driver}' has no option '{key}'")]
    UnknownOption {
        /// Driver name.
        driver: String,
        /// Rejected option key.
        key: String,
    },
    /// A log path referenced an identifier the model never issued.
    #[error("unknown statement '{id}'")]
    UnknownStatement {
        /// Offending identifier.
        id: StatementId,
    },
    /// A log path referenced a statement of the wrong kind.
    #[error("statement '{id}' is a {actual}, expected a {expected}")]
    KindMismatch {
        /// Offending identifier.
        id: StatementId,
        /// Kind required by the log path slot.
        expected: StatementKind,
        /// Kind of the referenced statement.
        actual: StatementKind,
    },
    /// A log path mutated after creation points at a missing statement.
    #[error("{logpath} references missing {kind} '{id}'")]
    DanglingReference {
        /// Log path holding the reference.
        logpath: LogPathId,
        /// Slot kind of the reference.
        kind: StatementKind,
        /// Missing identifier.
        id: StatementId,
    },
    /// A first generation was requested after one already happened.
    #[error("configuration already generated; pass re_create_config to regenerate")]
    AlreadyGenerated,
    /// The rendered configuration could not be written.
    #[error("failed to write configuration {path:?}: {source}")]
    WriteConfig {
        /// Destination path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A run-scoped resource could not be issued during resolution.
    #[error(transparent)]
    Resource(#[from] ContextError),
    /// The statement's transport could not be bound.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Umbrella error used by [`crate::Testcase`] and integration helpers.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Context preparation failed.
    #[error(transparent)]
    Context(#[from] ContextError),
    /// Configuration construction or rendering failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Transport I/O failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Daemon lifecycle failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
