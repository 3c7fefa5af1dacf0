//! Writer and listener handles bound to statement endpoints.
//!
//! A binding is created when its statement is created and is owned by the
//! caller. It only depends on the endpoint (a file path or a socket address),
//! never on the rendered configuration, so it keeps working across
//! regeneration and daemon reloads while the endpoint stays the same.

mod file;
mod network;

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::ids::{StatementId, StatementKind};

pub use file::{FileListener, FileWriter};
pub use network::{TcpListenerTransport, TcpWriter, UdpListenerTransport, UdpWriter};

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Network protocol of a network endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkTransport {
    /// Newline-framed stream.
    Tcp,
    /// One datagram per message.
    Udp,
}

impl NetworkTransport {
    /// Parses the daemon's `transport()` value, ignoring case.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            _ => None,
        }
    }
}

impl fmt::Display for NetworkTransport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => formatter.write_str("tcp"),
            Self::Udp => formatter.write_str("udp"),
        }
    }
}

/// Concrete connection parameters of a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// A single file.
    File(PathBuf),
    /// Files matching `pattern` inside `base`.
    Directory {
        /// Directory scanned by the daemon.
        base: PathBuf,
        /// Glob the daemon matches file names against.
        pattern: String,
    },
    /// A socket address.
    Network {
        /// Address.
        ip: IpAddr,
        /// Port.
        port: u16,
        /// Protocol.
        transport: NetworkTransport,
    },
}

impl fmt::Display for Endpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(formatter, "file:{}", path.display()),
            Self::Directory { base, pattern } => {
                write!(formatter, "dir:{}/{pattern}", base.display())
            }
            Self::Network {
                ip,
                port,
                transport,
            } => write!(formatter, "{transport}://{}", SocketAddr::new(*ip, *port)),
        }
    }
}

/// Errors raised by writers and listeners.
///
/// An empty receive is not an error; only genuine I/O failures are.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Reading or writing the endpoint failed.
    #[error("transport I/O on {endpoint} failed: {source}")]
    Io {
        /// Endpoint description.
        endpoint: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Connecting to or binding a socket failed.
    #[error("failed to connect {address}: {source}")]
    Connect {
        /// Socket address.
        address: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The statement has no harness-side endpoint.
    #[error("statement '{statement}' has no transport endpoint")]
    Unbound {
        /// Statement identifier.
        statement: StatementId,
    },
    /// A writer was requested from a destination or a listener from a source.
    #[error("statement '{statement}' is a {kind} and has no {wanted}")]
    WrongDirection {
        /// Statement identifier.
        statement: StatementId,
        /// Kind of the statement.
        kind: StatementKind,
        /// Handle that was requested.
        wanted: &'static str,
    },
}

impl TransportError {
    pub(crate) fn io(endpoint: &impl fmt::Display, source: io::Error) -> Self {
        Self::Io {
            endpoint: endpoint.to_string(),
            source,
        }
    }
}

/// Message injection capability of a source endpoint.
pub trait WriterTransport: Send + fmt::Debug {
    /// Writes one message.
    fn write_message(&mut self, message: &str) -> Result<(), TransportError>;
}

/// Message observation capability of a destination endpoint.
pub trait ListenerTransport: Send + fmt::Debug {
    /// Returns every complete message available now, without blocking.
    fn drain(&mut self) -> Result<Vec<String>, TransportError>;
}

/// Injects messages into a source endpoint.
#[derive(Debug)]
pub struct Writer {
    endpoint: Endpoint,
    inner: Box<dyn WriterTransport>,
}

impl Writer {
    /// Wraps a transport implementation.
    pub const fn new(endpoint: Endpoint, inner: Box<dyn WriterTransport>) -> Self {
        Self { endpoint, inner }
    }

    /// Endpoint the writer is bound to.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the endpoint cannot be written.
    pub fn send(&mut self, message: &str) -> Result<(), TransportError> {
        self.inner.write_message(message).inspect_err(|error| {
            warn!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, %error, "send failed");
        })
    }

    /// Sends each message in order.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first [`TransportError`].
    pub fn send_all<'a>(
        &mut self,
        messages: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), TransportError> {
        for message in messages {
            self.send(message)?;
        }
        Ok(())
    }
}

/// Observes messages delivered to a destination endpoint.
#[derive(Debug)]
pub struct Listener {
    endpoint: Endpoint,
    inner: Box<dyn ListenerTransport>,
    default_wait: Duration,
    poll_interval: Duration,
}

impl Listener {
    /// Wraps a transport implementation.
    pub fn new(
        endpoint: Endpoint,
        inner: Box<dyn ListenerTransport>,
        default_wait: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            endpoint,
            inner,
            default_wait,
            poll_interval,
        }
    }

    /// Endpoint the listener is bound to.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Waits up to the configured receive timeout for messages.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on I/O failure; an empty result means no
    /// message arrived in time.
    pub fn receive(&mut self) -> Result<Vec<String>, TransportError> {
        self.receive_within(self.default_wait)
    }

    /// Waits up to `timeout` for at least one message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on I/O failure.
    pub fn receive_within(&mut self, timeout: Duration) -> Result<Vec<String>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            let messages = self.inner.drain()?;
            if !messages.is_empty() {
                debug!(
                    target: TRANSPORT_TARGET,
                    endpoint = %self.endpoint,
                    count = messages.len(),
                    "received messages"
                );
                return Ok(messages);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    /// Collects messages until `count` have arrived or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on I/O failure.
    pub fn receive_count(
        &mut self,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<String>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut collected = Vec::new();
        while collected.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let batch = self.receive_within(remaining)?;
            if batch.is_empty() {
                break;
            }
            collected.extend(batch);
        }
        Ok(collected)
    }
}

/// Live handle attached to a statement.
#[derive(Debug)]
pub enum TransportBinding {
    /// Source-side injection.
    Writer(Writer),
    /// Destination-side observation.
    Listener(Listener),
    /// No harness-side endpoint.
    Unbound,
}

/// Waits applied by listeners created through [`bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerTiming {
    /// Wait used by [`Listener::receive`].
    pub default_wait: Duration,
    /// Sleep between polls.
    pub poll_interval: Duration,
}

/// Establishes the binding for a statement of `kind` at `endpoint`.
///
/// Listeners on sockets bind immediately so the daemon can connect as soon as
/// it starts; writers connect lazily on first send.
///
/// # Errors
///
/// Returns [`TransportError::Connect`] when a listening socket cannot be
/// bound.
pub fn bind(
    kind: StatementKind,
    resolved: Option<&Endpoint>,
    timing: ListenerTiming,
) -> Result<TransportBinding, TransportError> {
    let Some(endpoint) = resolved else {
        return Ok(TransportBinding::Unbound);
    };
    let binding = match (kind, endpoint) {
        (StatementKind::Source, Endpoint::File(path)) => {
            writer(endpoint, Box::new(FileWriter::new(path.clone())))
        }
        (StatementKind::Source, Endpoint::Directory { base, pattern }) => writer(
            endpoint,
            Box::new(FileWriter::in_directory(base.clone(), pattern)),
        ),
        (StatementKind::Source, Endpoint::Network { ip, port, transport }) => {
            let address = SocketAddr::new(*ip, *port);
            match transport {
                NetworkTransport::Tcp => writer(endpoint, Box::new(TcpWriter::new(address))),
                NetworkTransport::Udp => writer(endpoint, Box::new(UdpWriter::new(address))),
            }
        }
        (StatementKind::Destination, Endpoint::File(path)) => {
            listener(endpoint, Box::new(FileListener::new(path.clone())), timing)
        }
        (StatementKind::Destination, Endpoint::Directory { .. }) => TransportBinding::Unbound,
        (StatementKind::Destination, Endpoint::Network { ip, port, transport }) => {
            let address = SocketAddr::new(*ip, *port);
            match transport {
                NetworkTransport::Tcp => listener(
                    endpoint,
                    Box::new(TcpListenerTransport::bind(address)?),
                    timing,
                ),
                NetworkTransport::Udp => listener(
                    endpoint,
                    Box::new(UdpListenerTransport::bind(address)?),
                    timing,
                ),
            }
        }
    };
    debug!(target: TRANSPORT_TARGET, %kind, %endpoint, "bound transport");
    Ok(binding)
}

fn writer(endpoint: &Endpoint, inner: Box<dyn WriterTransport>) -> TransportBinding {
    TransportBinding::Writer(Writer::new(endpoint.clone(), inner))
}

fn listener(
    endpoint: &Endpoint,
    inner: Box<dyn ListenerTransport>,
    timing: ListenerTiming,
) -> TransportBinding {
    TransportBinding::Listener(Listener::new(
        endpoint.clone(),
        inner,
        timing.default_wait,
        timing.poll_interval,
    ))
}
