//! Message producers feeding the router.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use tracing::debug;

use super::{ROUTING_TARGET, filename_matches};

const DATAGRAM_LIMIT: usize = 65_536;

/// Splits complete lines off `buffer`, leaving any trailing fragment.
pub(super) fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let Some(last_newline) = buffer.iter().rposition(|byte| *byte == b'\n') else {
        return Vec::new();
    };
    let remainder = buffer.split_off(last_newline + 1);
    let complete = std::mem::replace(buffer, remainder);
    String::from_utf8_lossy(&complete)
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Follows one file from a remembered offset.
#[derive(Debug)]
pub(super) struct FileTail {
    path: PathBuf,
    offset: u64,
    partial: Vec<u8>,
}

impl FileTail {
    pub(super) fn new(path: PathBuf) -> Self {
        Self {
            path,
            offset: 0,
            partial: Vec::new(),
        }
    }

    pub(super) fn poll(&mut self) -> io::Result<Vec<String>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };
        let length = file.metadata()?.len();
        if length < self.offset {
            self.offset = 0;
            self.partial.clear();
        }
        file.seek(SeekFrom::Start(self.offset))?;
        let read = file.read_to_end(&mut self.partial)?;
        self.offset += read as u64;
        Ok(drain_lines(&mut self.partial))
    }
}

/// Follows files under a directory whose names match a pattern.
///
/// Files are adopted in path order; once `max_files` are followed, newly
/// appearing files are ignored.
#[derive(Debug)]
pub(super) struct WildcardTail {
    base: PathBuf,
    pattern: String,
    recursive: bool,
    max_files: usize,
    files: BTreeMap<PathBuf, FileTail>,
}

impl WildcardTail {
    pub(super) const fn new(base: PathBuf, pattern: String) -> Self {
        Self {
            base,
            pattern,
            recursive: false,
            max_files: usize::MAX,
            files: BTreeMap::new(),
        }
    }

    /// Also descend into subdirectories of the base directory.
    pub(super) const fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Caps the number of followed files.
    pub(super) const fn max_files(mut self, limit: usize) -> Self {
        self.max_files = limit;
        self
    }

    fn matching_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut pending = vec![self.base.clone()];
        let mut found = Vec::new();
        while let Some(dir) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(error) if error.kind() == ErrorKind::NotFound => continue,
                Err(error) => return Err(error),
            };
            for entry in entries {
                let entry = entry?;
                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    if self.recursive {
                        pending.push(entry.path());
                    }
                } else if file_type.is_file()
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| filename_matches(&self.pattern, name))
                {
                    found.push(entry.path());
                }
            }
        }
        found.sort();
        Ok(found)
    }

    pub(super) fn poll(&mut self) -> io::Result<Vec<String>> {
        for path in self.matching_files()? {
            if self.files.contains_key(&path) {
                continue;
            }
            if self.files.len() >= self.max_files {
                debug!(
                    target: ROUTING_TARGET,
                    path = %path.display(),
                    max_files = self.max_files,
                    "max-files reached, not following"
                );
                continue;
            }
            self.files.insert(path.clone(), FileTail::new(path));
        }
        let mut messages = Vec::new();
        for tail in self.files.values_mut() {
            messages.extend(tail.poll()?);
        }
        Ok(messages)
    }
}

#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    buffer: Vec<u8>,
}

/// Newline-framed TCP listener.
#[derive(Debug)]
pub(super) struct TcpIngress {
    listener: TcpListener,
    connections: Vec<Connection>,
}

impl TcpIngress {
    pub(super) fn bind(address: (std::net::IpAddr, u16)) -> io::Result<Self> {
        let listener = TcpListener::bind(address)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            connections: Vec::new(),
        })
    }

    pub(super) fn poll(&mut self) -> io::Result<Vec<String>> {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(true)?;
                    self.connections.push(Connection {
                        stream,
                        buffer: Vec::new(),
                    });
                }
                Err(error) if error.kind() == ErrorKind::WouldBlock => break,
                Err(error) => return Err(error),
            }
        }
        let mut messages = Vec::new();
        let mut chunk = [0_u8; 4096];
        self.connections.retain_mut(|connection| {
            let open = loop {
                match connection.stream.read(&mut chunk) {
                    Ok(0) => break false,
                    Ok(read) => connection
                        .buffer
                        .extend_from_slice(chunk.get(..read).unwrap_or_default()),
                    Err(error) if error.kind() == ErrorKind::WouldBlock => break true,
                    Err(error) if error.kind() == ErrorKind::Interrupted => {}
                    Err(_) => break false,
                }
            };
            messages.extend(drain_lines(&mut connection.buffer));
            if !open && !connection.buffer.is_empty() {
                connection.buffer.push(b'\n');
                messages.extend(drain_lines(&mut connection.buffer));
            }
            open
        });
        Ok(messages)
    }
}

/// UDP socket yielding one message per datagram line.
#[derive(Debug)]
pub(super) struct UdpIngress {
    socket: UdpSocket,
}

impl UdpIngress {
    pub(super) fn bind(address: (std::net::IpAddr, u16)) -> io::Result<Self> {
        let socket = UdpSocket::bind(address)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }

    pub(super) fn poll(&mut self) -> io::Result<Vec<String>> {
        let mut messages = Vec::new();
        let mut datagram = vec![0_u8; DATAGRAM_LIMIT];
        loop {
            match self.socket.recv_from(&mut datagram) {
                Ok((read, _)) => {
                    let mut payload = datagram.get(..read).unwrap_or_default().to_vec();
                    payload.push(b'\n');
                    messages.extend(drain_lines(&mut payload));
                }
                Err(error) if error.kind() == ErrorKind::WouldBlock => return Ok(messages),
                Err(error) => return Err(error),
            }
        }
    }
}

/// Shell command whose stdout lines become messages.
#[derive(Debug)]
pub(super) struct ProgramIngress {
    child: Child,
    lines: Receiver<String>,
}

impl ProgramIngress {
    pub(super) fn spawn(command: &str) -> io::Result<Self> {
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("program stdout was not captured"))?;
        let (sender, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if sender.send(line).is_err() {
                    break;
                }
            }
        });
        Ok(Self { child, lines })
    }

    pub(super) fn poll(&mut self) -> io::Result<Vec<String>> {
        let mut messages = Vec::new();
        loop {
            match self.lines.try_recv() {
                Ok(line) if line.is_empty() => {}
                Ok(line) => messages.push(line),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return Ok(messages),
            }
        }
    }
}

impl Drop for ProgramIngress {
    fn drop(&mut self) {
        super::reap(&mut self.child);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn drain_lines_keeps_fragments() {
        let mut buffer = b"one\r\ntwo\nthr".to_vec();
        assert_eq!(drain_lines(&mut buffer), vec!["one", "two"]);
        assert_eq!(buffer, b"thr");
    }

    #[test]
    fn file_tail_resumes_and_handles_truncation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("in.log");
        let mut tail = FileTail::new(path.clone());
        assert!(tail.poll().expect("missing file").is_empty());

        fs::write(&path, "first\nsec").expect("write");
        assert_eq!(tail.poll().expect("poll"), vec!["first"]);
        let mut file = fs::OpenOptions::new().append(true).open(&path).expect("open");
        file.write_all(b"ond\n").expect("append");
        assert_eq!(tail.poll().expect("poll"), vec!["second"]);

        fs::write(&path, "fresh\n").expect("truncate");
        assert_eq!(tail.poll().expect("poll"), vec!["fresh"]);
    }

    #[test]
    fn wildcard_tail_only_follows_matching_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.log"), "alpha\n").expect("write");
        fs::write(dir.path().join("b.txt"), "ignored\n").expect("write");
        let mut tail = WildcardTail::new(dir.path().to_path_buf(), "*.log".to_owned());
        assert_eq!(tail.poll().expect("poll"), vec!["alpha"]);
        fs::write(dir.path().join("c.log"), "gamma\n").expect("write");
        assert_eq!(tail.poll().expect("poll"), vec!["gamma"]);
    }

    #[test]
    fn wildcard_tail_descends_only_when_recursive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("sub").join("deeper");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(dir.path().join("a.log"), "top\n").expect("write");
        fs::write(nested.join("b.log"), "deep\n").expect("write");

        let mut flat = WildcardTail::new(dir.path().to_path_buf(), "*.log".to_owned());
        assert_eq!(flat.poll().expect("poll"), vec!["top"]);

        let mut walked =
            WildcardTail::new(dir.path().to_path_buf(), "*.log".to_owned()).recursive(true);
        assert_eq!(walked.poll().expect("poll"), vec!["top", "deep"]);
    }

    #[test]
    fn wildcard_tail_stops_adopting_at_max_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.log"), "alpha\n").expect("write");
        fs::write(dir.path().join("b.log"), "beta\n").expect("write");
        let mut tail = WildcardTail::new(dir.path().to_path_buf(), "*.log".to_owned()).max_files(1);
        assert_eq!(tail.poll().expect("poll"), vec!["alpha"]);

        fs::write(dir.path().join("0.log"), "late\n").expect("write");
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("a.log"))
            .expect("open");
        file.write_all(b"again\n").expect("append");
        assert_eq!(tail.poll().expect("poll"), vec!["again"]);
    }

    #[test]
    fn tcp_ingress_flushes_unterminated_line_on_close() {
        let mut ingress = TcpIngress::bind((Ipv4Addr::LOCALHOST.into(), 0)).expect("bind");
        let address = ingress.listener.local_addr().expect("address");
        {
            let mut client = TcpStream::connect(address).expect("connect");
            client.write_all(b"one\ntwo").expect("write");
        }
        let mut received = Vec::new();
        for _ in 0..100 {
            received.extend(ingress.poll().expect("poll"));
            if received.len() == 2 {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(received, vec!["one", "two"]);
    }
}
