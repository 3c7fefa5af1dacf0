//! Collision-free file paths and network ports for one test run.

use std::collections::HashSet;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use std::path::{Path, PathBuf};
use std::process;

use thiserror::Error;
use tracing::debug;

const PATHS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::paths");
const PORT_ATTEMPTS: usize = 32;

/// Issues unique paths inside a run directory.
///
/// Uniqueness across concurrently running test processes comes from the run
/// directory itself, which is created with a random name, and from the process
/// identifier embedded in every issued name. Paths are recorded so teardown
/// can inspect or remove them; the registry never touches the filesystem.
#[derive(Debug)]
pub struct UniquePathRegistry {
    root: PathBuf,
    token: u32,
    serial: u64,
    registered: Vec<PathBuf>,
}

impl UniquePathRegistry {
    /// Creates a registry issuing paths under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            token: process::id(),
            serial: 0,
            registered: Vec::new(),
        }
    }

    /// Directory under which every path is issued.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns a fresh `.log` file path derived from `prefix`.
    pub fn get_registered_file_path(&mut self, prefix: &str) -> PathBuf {
        let name = format!("{}.log", self.next_stem(prefix));
        self.register(name)
    }

    /// Returns a fresh directory path derived from `prefix`.
    pub fn get_registered_dir_path(&mut self, prefix: &str) -> PathBuf {
        let name = self.next_stem(prefix);
        self.register(name)
    }

    /// Every path issued so far, in issue order.
    #[must_use]
    pub fn registered_paths(&self) -> &[PathBuf] {
        &self.registered
    }

    fn next_stem(&mut self, prefix: &str) -> String {
        self.serial += 1;
        format!("{}_{}_{}", sanitise(prefix), self.serial, self.token)
    }

    fn register(&mut self, name: String) -> PathBuf {
        let path = self.root.join(name);
        debug!(target: PATHS_TARGET, path = %path.display(), "registered path");
        self.registered.push(path.clone());
        path
    }
}

fn sanitise(prefix: &str) -> String {
    let cleaned: String = prefix
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || character == '_' || character == '-' {
                character
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "path".to_owned()
    } else {
        cleaned
    }
}

/// Errors raised while reserving network ports.
#[derive(Debug, Error)]
pub enum PortError {
    /// Binding the probe socket failed.
    #[error("failed to probe for a free port: {source}")]
    Probe {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The operating system kept returning ports already issued.
    #[error("no unused port found after {attempts} attempts")]
    Exhausted {
        /// Number of probes made.
        attempts: usize,
    },
}

/// Issues loopback ports that are free at allocation time.
///
/// The operating system picks each port; the allocator only guarantees it
/// never hands out the same port twice within one run.
#[derive(Debug, Default)]
pub struct PortAllocator {
    issued: HashSet<u16>,
}

impl PortAllocator {
    /// Creates an allocator with no ports issued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a port not previously issued by this allocator.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Probe`] when the probe socket cannot be bound and
    /// [`PortError::Exhausted`] when every probe returned a known port.
    pub fn allocate(&mut self) -> Result<u16, PortError> {
        for _ in 0..PORT_ATTEMPTS {
            let port = probe_port()?;
            if self.issued.insert(port) {
                debug!(target: PATHS_TARGET, port, "allocated port");
                return Ok(port);
            }
        }
        Err(PortError::Exhausted {
            attempts: PORT_ATTEMPTS,
        })
    }

    /// Ports issued so far.
    #[must_use]
    pub fn issued(&self) -> usize {
        self.issued.len()
    }
}

fn probe_port() -> Result<u16, PortError> {
    let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
        .map_err(|source| PortError::Probe { source })?;
    let address = listener
        .local_addr()
        .map_err(|source| PortError::Probe { source })?;
    Ok(address.port())
}
