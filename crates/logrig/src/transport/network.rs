//! TCP and UDP writers and listeners on loopback endpoints.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::time::Duration;

use tracing::debug;

use super::file::split_lines;
use super::{ListenerTransport, TRANSPORT_TARGET, TransportError, WriterTransport};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_DATAGRAM: usize = 65_507;

/// Sends newline-framed messages over a lazily opened TCP connection.
///
/// A failed write drops the connection and retries once on a fresh one, which
/// covers the daemon closing its listener during a reload.
#[derive(Debug)]
pub struct TcpWriter {
    address: SocketAddr,
    stream: Option<TcpStream>,
}

impl TcpWriter {
    /// Writer targeting `address`.
    #[must_use]
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            stream: None,
        }
    }

    fn try_write(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let address = self.address;
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                let stream = TcpStream::connect_timeout(&address, CONNECT_TIMEOUT)
                    .map_err(|source| TransportError::Connect { address, source })?;
                debug!(target: TRANSPORT_TARGET, %address, "connected writer");
                stream
            }
        };
        stream
            .write_all(frame)
            .and_then(|()| stream.flush())
            .map_err(|source| TransportError::io(&address, source))?;
        self.stream = Some(stream);
        Ok(())
    }
}

impl WriterTransport for TcpWriter {
    fn write_message(&mut self, message: &str) -> Result<(), TransportError> {
        let frame = format!("{message}\n");
        if self.try_write(frame.as_bytes()).is_ok() {
            return Ok(());
        }
        self.try_write(frame.as_bytes())
    }
}

/// Sends one datagram per message.
#[derive(Debug)]
pub struct UdpWriter {
    address: SocketAddr,
    socket: Option<UdpSocket>,
}

impl UdpWriter {
    /// Writer targeting `address`.
    #[must_use]
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            socket: None,
        }
    }
}

impl WriterTransport for UdpWriter {
    fn write_message(&mut self, message: &str) -> Result<(), TransportError> {
        let address = self.address;
        let socket = match self.socket.take() {
            Some(socket) => socket,
            None => UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
                .map_err(|source| TransportError::Connect { address, source })?,
        };
        let sent = socket
            .send_to(message.as_bytes(), address)
            .map(|_| ())
            .map_err(|source| TransportError::io(&address, source));
        self.socket = Some(socket);
        sent
    }
}

#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    pending: Vec<u8>,
    open: bool,
}

/// Accepts daemon connections and collects newline-framed messages.
///
/// The socket is bound when the statement is created, so the daemon's
/// destination can connect as soon as it starts.
#[derive(Debug)]
pub struct TcpListenerTransport {
    address: SocketAddr,
    listener: TcpListener,
    connections: Vec<Connection>,
}

impl TcpListenerTransport {
    /// Binds `address` in non-blocking mode.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] when the address cannot be bound.
    pub fn bind(address: SocketAddr) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(address)
            .and_then(|listener| listener.set_nonblocking(true).map(|()| listener))
            .map_err(|source| TransportError::Connect { address, source })?;
        Ok(Self {
            address,
            listener,
            connections: Vec::new(),
        })
    }

    fn accept_pending(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(true)?;
                    debug!(target: TRANSPORT_TARGET, %peer, "accepted daemon connection");
                    self.connections.push(Connection {
                        stream,
                        pending: Vec::new(),
                        open: true,
                    });
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(error) => return Err(error),
            }
        }
    }
}

impl Connection {
    fn read_available(&mut self) -> io::Result<()> {
        let mut chunk = [0_u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.open = false;
                    return Ok(());
                }
                Ok(read) => self.pending.extend_from_slice(chunk.get(..read).unwrap_or_default()),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(error) if error.kind() == io::ErrorKind::ConnectionReset => {
                    self.open = false;
                    return Ok(());
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn take_lines(&mut self) -> Vec<String> {
        let cut = if self.open {
            self.pending.iter().rposition(|byte| *byte == b'\n').map(|index| index + 1)
        } else {
            Some(self.pending.len())
        };
        let Some(cut) = cut else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.pending.drain(..cut).collect();
        split_lines(&complete)
    }
}

impl ListenerTransport for TcpListenerTransport {
    fn drain(&mut self) -> Result<Vec<String>, TransportError> {
        let address = self.address;
        self.accept_pending()
            .map_err(|source| TransportError::io(&address, source))?;
        let mut messages = Vec::new();
        for connection in &mut self.connections {
            connection
                .read_available()
                .map_err(|source| TransportError::io(&address, source))?;
            messages.extend(connection.take_lines());
        }
        self.connections.retain(|connection| connection.open);
        Ok(messages)
    }
}

/// Receives datagrams; each datagram may carry several lines.
#[derive(Debug)]
pub struct UdpListenerTransport {
    address: SocketAddr,
    socket: UdpSocket,
}

impl UdpListenerTransport {
    /// Binds `address` in non-blocking mode.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] when the address cannot be bound.
    pub fn bind(address: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(address)
            .and_then(|socket| socket.set_nonblocking(true).map(|()| socket))
            .map_err(|source| TransportError::Connect { address, source })?;
        Ok(Self { address, socket })
    }
}

impl ListenerTransport for UdpListenerTransport {
    fn drain(&mut self) -> Result<Vec<String>, TransportError> {
        let mut buffer = vec![0_u8; MAX_DATAGRAM];
        let mut messages = Vec::new();
        loop {
            match self.socket.recv_from(&mut buffer) {
                Ok((read, _)) => {
                    messages.extend(split_lines(buffer.get(..read).unwrap_or_default()));
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(messages),
                Err(source) => return Err(TransportError::io(&self.address, source)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::thread;
    use std::time::Instant;

    use super::*;

    fn drain_until(listener: &mut dyn ListenerTransport, count: usize) -> Vec<String> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = Vec::new();
        while seen.len() < count && Instant::now() < deadline {
            seen.extend(listener.drain().expect("drain"));
            thread::sleep(Duration::from_millis(10));
        }
        seen
    }

    #[test]
    fn tcp_round_trip_across_reconnect() {
        let address = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        let probe = TcpListener::bind(address).expect("probe");
        let bound = probe.local_addr().expect("addr");
        drop(probe);
        let mut listener = TcpListenerTransport::bind(bound).expect("bind");
        let mut writer = TcpWriter::new(bound);
        writer.write_message("first").expect("send");
        writer.stream = None;
        writer.write_message("second").expect("send");
        assert_eq!(drain_until(&mut listener, 2), vec!["first", "second"]);
    }

    #[test]
    fn udp_datagrams_are_split_into_lines() {
        let mut listener =
            UdpListenerTransport::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).expect("bind");
        let bound = listener.socket.local_addr().expect("addr");
        let mut writer = UdpWriter::new(bound);
        writer.write_message("alpha\nbeta").expect("send");
        assert_eq!(drain_until(&mut listener, 2), vec!["alpha", "beta"]);
    }
}
