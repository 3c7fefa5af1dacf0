//! File-backed writers and listeners.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use super::{ListenerTransport, TransportError, WriterTransport};

/// Appends one line per message to a file, creating it on first use.
#[derive(Debug)]
pub struct FileWriter {
    path: PathBuf,
}

impl FileWriter {
    /// Writer appending to `path`.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Writer appending to a file in `base` whose name matches `pattern`.
    #[must_use]
    pub fn in_directory(base: PathBuf, pattern: &str) -> Self {
        Self::new(base.join(concrete_name(pattern)))
    }

    /// File the writer appends to.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

/// Replaces glob metacharacters so the name matches `pattern`.
fn concrete_name(pattern: &str) -> String {
    let name: String = pattern
        .chars()
        .map(|character| match character {
            '*' => "logrig".to_owned(),
            '?' => "x".to_owned(),
            other => other.to_string(),
        })
        .collect();
    if name.is_empty() {
        "logrig.log".to_owned()
    } else {
        name
    }
}

impl WriterTransport for FileWriter {
    fn write_message(&mut self, message: &str) -> Result<(), TransportError> {
        let describe = self.path.display();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| TransportError::io(&describe, source))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| TransportError::io(&describe, source))?;
        let mut line = String::with_capacity(message.len() + 1);
        line.push_str(message);
        line.push('\n');
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| TransportError::io(&describe, source))
    }
}

/// Reads complete lines appended to a file since the previous read.
///
/// The file is reopened by path on every poll so a file that does not exist
/// yet is picked up without re-binding. A file shorter than the stored offset
/// is treated as truncated and read from the start. Once the file has been
/// opened, its disappearance is an I/O error rather than an empty read.
#[derive(Debug)]
pub struct FileListener {
    path: PathBuf,
    offset: u64,
    seen: bool,
}

impl FileListener {
    /// Listener tailing `path` from its start.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self {
            path,
            offset: 0,
            seen: false,
        }
    }

    fn read_new_bytes(&mut self) -> io::Result<Vec<u8>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound && !self.seen => {
                return Ok(Vec::new());
            }
            Err(error) => return Err(error),
        };
        self.seen = true;
        let length = file.metadata()?.len();
        if length < self.offset {
            self.offset = 0;
        }
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

impl ListenerTransport for FileListener {
    fn drain(&mut self) -> Result<Vec<String>, TransportError> {
        let buffer = self
            .read_new_bytes()
            .map_err(|source| TransportError::io(&self.path.display(), source))?;
        let Some(last_newline) = buffer.iter().rposition(|byte| *byte == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = buffer.get(..=last_newline).unwrap_or_default();
        self.offset += complete.len() as u64;
        Ok(split_lines(complete))
    }
}

pub(super) fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}
