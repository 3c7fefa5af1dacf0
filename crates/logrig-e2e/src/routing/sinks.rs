//! Message consumers fed by the router.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, UdpSocket};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Appends messages to a file.
#[derive(Debug)]
pub(super) struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub(super) fn open(path: PathBuf) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    pub(super) fn deliver(&mut self, message: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{message}")
    }
}

/// Sends newline-framed messages over a lazily opened TCP connection.
#[derive(Debug)]
pub(super) struct TcpSink {
    address: SocketAddr,
    stream: Option<TcpStream>,
}

impl TcpSink {
    pub(super) fn new(address: SocketAddr) -> Self {
        Self {
            address,
            stream: None,
        }
    }

    fn write_once(&mut self, frame: &[u8]) -> io::Result<()> {
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => TcpStream::connect_timeout(&self.address, CONNECT_TIMEOUT)?,
        };
        stream.write_all(frame)?;
        self.stream = Some(stream);
        Ok(())
    }

    pub(super) fn deliver(&mut self, message: &str) -> io::Result<()> {
        let frame = format!("{message}\n");
        match self.write_once(frame.as_bytes()) {
            Ok(()) => Ok(()),
            // The peer may have restarted its listener; reconnect once.
            Err(_) => self.write_once(frame.as_bytes()),
        }
    }
}

/// Sends one datagram per message.
#[derive(Debug)]
pub(super) struct UdpSink {
    address: SocketAddr,
    socket: UdpSocket,
}

impl UdpSink {
    pub(super) fn open(address: SocketAddr) -> io::Result<Self> {
        let local: SocketAddr = if address.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        Ok(Self {
            address,
            socket: UdpSocket::bind(local)?,
        })
    }

    pub(super) fn deliver(&mut self, message: &str) -> io::Result<()> {
        self.socket
            .send_to(message.as_bytes(), self.address)
            .map(|_| ())
    }
}

/// Shell command receiving messages on stdin.
#[derive(Debug)]
pub(super) struct ProgramSink {
    child: Child,
    stdin: ChildStdin,
}

impl ProgramSink {
    pub(super) fn spawn(command: &str) -> io::Result<Self> {
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("program stdin was not captured"))?;
        Ok(Self { child, stdin })
    }

    pub(super) fn deliver(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.stdin, "{message}")?;
        self.stdin.flush()
    }
}

impl Drop for ProgramSink {
    fn drop(&mut self) {
        super::reap(&mut self.child);
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn file_sink_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("out.log");
        let mut sink = FileSink::open(path.clone()).expect("open");
        sink.deliver("one").expect("deliver");
        sink.deliver("two").expect("deliver");
        assert_eq!(fs::read_to_string(path).expect("read"), "one\ntwo\n");
    }

    #[test]
    fn tcp_sink_frames_messages_with_newlines() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
        let mut sink = TcpSink::new(listener.local_addr().expect("address"));
        sink.deliver("hello").expect("deliver");
        let (stream, _) = listener.accept().expect("accept");
        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).expect("read");
        assert_eq!(line, "hello\n");
    }
}
