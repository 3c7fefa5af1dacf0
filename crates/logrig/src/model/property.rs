//! Caller-owned bundle returned with every new statement.

use crate::ids::{StatementId, StatementKind};
use crate::options::OptionMap;
use crate::transport::{Endpoint, Listener, TransportBinding, TransportError, Writer};

/// Resolved connection options and the live transport of one statement.
///
/// The bundle does not borrow the model, so it outlives any number of
/// regenerations.
#[derive(Debug)]
pub struct DriverProperty {
    statement: StatementId,
    kind: StatementKind,
    connection_options: OptionMap,
    endpoint: Option<Endpoint>,
    transport: TransportBinding,
}

impl DriverProperty {
    pub(crate) fn new(
        statement: StatementId,
        kind: StatementKind,
        connection_options: OptionMap,
        endpoint: Option<Endpoint>,
        transport: TransportBinding,
    ) -> Self {
        Self {
            statement,
            kind,
            connection_options,
            endpoint,
            transport,
        }
    }

    /// Statement this bundle belongs to.
    #[must_use]
    pub const fn statement(&self) -> &StatementId {
        &self.statement
    }

    /// Resolved options covering the driver's mandatory keys.
    #[must_use]
    pub const fn connection_options(&self) -> &OptionMap {
        &self.connection_options
    }

    /// Endpoint the transport is bound to.
    #[must_use]
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Raw binding.
    #[must_use]
    pub const fn transport(&self) -> &TransportBinding {
        &self.transport
    }

    /// Writer of a source statement.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::WrongDirection`] for a destination and
    /// [`TransportError::Unbound`] when no endpoint was derived.
    pub fn writer(&mut self) -> Result<&mut Writer, TransportError> {
        match &mut self.transport {
            TransportBinding::Writer(writer) => Ok(writer),
            TransportBinding::Listener(_) => Err(TransportError::WrongDirection {
                statement: self.statement.clone(),
                kind: self.kind,
                wanted: "writer",
            }),
            TransportBinding::Unbound => Err(TransportError::Unbound {
                statement: self.statement.clone(),
            }),
        }
    }

    /// Listener of a destination statement.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::WrongDirection`] for a source and
    /// [`TransportError::Unbound`] when no endpoint was derived.
    pub fn listener(&mut self) -> Result<&mut Listener, TransportError> {
        match &mut self.transport {
            TransportBinding::Listener(listener) => Ok(listener),
            TransportBinding::Writer(_) => Err(TransportError::WrongDirection {
                statement: self.statement.clone(),
                kind: self.kind,
                wanted: "listener",
            }),
            TransportBinding::Unbound => Err(TransportError::Unbound {
                statement: self.statement.clone(),
            }),
        }
    }
}
