//! Runtime routing of messages from sources to destinations.
//!
//! A [`Router`] owns one live handle per declared statement. Reconfiguring
//! keeps the handle of every statement whose declaration did not change, so
//! file offsets, listening sockets and program children survive a reload.

mod sinks;
mod sources;

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::Child;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::grammar::{DriverDecl, LogDecl, StubConfig};
use sinks::{FileSink, ProgramSink, TcpSink, UdpSink};
use sources::{FileTail, ProgramIngress, TcpIngress, UdpIngress, WildcardTail};

const ROUTING_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::routing");
const DEFAULT_IP: &str = "127.0.0.1";
const DEFAULT_MAX_FILES: usize = 100;

/// Errors raised while opening statement handles.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The driver is not implemented for this statement kind.
    #[error("{kind} '{id}' uses unsupported driver '{driver}'")]
    UnsupportedDriver {
        /// `source` or `destination`.
        kind: &'static str,
        /// Statement identifier.
        id: String,
        /// Driver name.
        driver: String,
    },
    /// A required option is missing.
    #[error("{kind} '{id}' is missing option '{key}'")]
    MissingOption {
        /// `source` or `destination`.
        kind: &'static str,
        /// Statement identifier.
        id: String,
        /// Missing key.
        key: &'static str,
    },
    /// An option value cannot be interpreted.
    #[error("{kind} '{id}' has invalid {key}({value})")]
    InvalidOption {
        /// `source` or `destination`.
        kind: &'static str,
        /// Statement identifier.
        id: String,
        /// Offending key.
        key: &'static str,
        /// Offending value.
        value: String,
    },
    /// Opening the handle failed.
    #[error("failed to open {kind} '{id}': {source}")]
    Open {
        /// `source` or `destination`.
        kind: &'static str,
        /// Statement identifier.
        id: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Matches a file name against a `filename-pattern`.
///
/// Supports `*`, `?`, `[ab]` and `{a,b}`; `*` never crosses a `/`.
#[must_use]
pub fn filename_matches(pattern: &str, name: &str) -> bool {
    glob_match::glob_match(pattern, name)
}

#[derive(Debug)]
enum Source {
    File(FileTail),
    Wildcard(WildcardTail),
    Tcp(TcpIngress),
    Udp(UdpIngress),
    Program(ProgramIngress),
    Internal,
}

#[derive(Debug)]
enum Sink {
    File(FileSink),
    Tcp(TcpSink),
    Udp(UdpSink),
    Program(ProgramSink),
}

impl Sink {
    fn deliver(&mut self, message: &str) -> io::Result<()> {
        match self {
            Self::File(sink) => sink.deliver(message),
            Self::Tcp(sink) => sink.deliver(message),
            Self::Udp(sink) => sink.deliver(message),
            Self::Program(sink) => sink.deliver(message),
        }
    }
}

#[derive(Debug)]
struct Slot<T> {
    decl: DriverDecl,
    handle: T,
}

/// Live handles for one configuration.
#[derive(Debug, Default)]
pub struct Router {
    sources: BTreeMap<String, Slot<Source>>,
    destinations: BTreeMap<String, Slot<Sink>>,
    logs: Vec<LogDecl>,
    internal: VecDeque<String>,
}

impl Router {
    /// Opens handles for every statement of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError`] when a statement cannot be opened.
    pub fn build(config: &StubConfig) -> Result<Self, RouteError> {
        let mut router = Self::default();
        router.reconfigure(config)?;
        Ok(router)
    }

    /// Switches to `config`, keeping handles of unchanged statements.
    ///
    /// Nothing changes when an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError`] when a new or changed statement cannot be
    /// opened.
    pub fn reconfigure(&mut self, config: &StubConfig) -> Result<(), RouteError> {
        let mut opened_sources = BTreeMap::new();
        for (id, decl) in &config.sources {
            if !unchanged(&self.sources, id, decl) {
                opened_sources.insert(id.clone(), open_source(id, decl)?);
            }
        }
        let mut opened_sinks = BTreeMap::new();
        for (id, decl) in &config.destinations {
            if !unchanged(&self.destinations, id, decl) {
                opened_sinks.insert(id.clone(), open_sink(id, decl)?);
            }
        }

        let kept = (
            config.sources.len() - opened_sources.len(),
            config.destinations.len() - opened_sinks.len(),
        );
        self.sources = merge(&config.sources, std::mem::take(&mut self.sources), opened_sources);
        self.destinations = merge(
            &config.destinations,
            std::mem::take(&mut self.destinations),
            opened_sinks,
        );
        self.logs.clone_from(&config.logs);
        info!(
            target: ROUTING_TARGET,
            sources = self.sources.len(),
            destinations = self.destinations.len(),
            logs = self.logs.len(),
            kept_sources = kept.0,
            kept_destinations = kept.1,
            "routing configured"
        );
        Ok(())
    }

    /// Queues a message for every `internal()` source.
    pub fn emit_internal(&mut self, message: impl Into<String>) {
        self.internal.push_back(message.into());
    }

    /// Moves every pending message to its destinations.
    ///
    /// I/O failures are logged and skipped; the daemon keeps running.
    pub fn pump(&mut self) -> usize {
        let internal: Vec<String> = self.internal.drain(..).collect();
        let mut batches = Vec::new();
        for (id, slot) in &mut self.sources {
            let polled = match &mut slot.handle {
                Source::File(tail) => tail.poll(),
                Source::Wildcard(tail) => tail.poll(),
                Source::Tcp(ingress) => ingress.poll(),
                Source::Udp(ingress) => ingress.poll(),
                Source::Program(ingress) => ingress.poll(),
                Source::Internal => Ok(internal.clone()),
            };
            match polled {
                Ok(messages) if messages.is_empty() => {}
                Ok(messages) => batches.push((id.clone(), messages)),
                Err(error) => {
                    warn!(target: ROUTING_TARGET, source = %id, %error, "failed to read source");
                }
            }
        }

        let mut delivered = 0;
        for (source, messages) in batches {
            for log in self.logs.iter().filter(|log| log.sources.contains(&source)) {
                for destination in &log.destinations {
                    let Some(slot) = self.destinations.get_mut(destination) else {
                        continue;
                    };
                    for message in &messages {
                        match slot.handle.deliver(message) {
                            Ok(()) => delivered += 1,
                            Err(error) => warn!(
                                target: ROUTING_TARGET,
                                %source,
                                %destination,
                                %error,
                                "failed to deliver message"
                            ),
                        }
                    }
                }
            }
        }
        if delivered > 0 {
            debug!(target: ROUTING_TARGET, delivered, "routed messages");
        }
        delivered
    }
}

fn reap(child: &mut Child) {
    if let Err(error) = child.kill().and_then(|()| child.wait().map(drop)) {
        debug!(target: ROUTING_TARGET, pid = child.id(), %error, "program already gone");
    }
}

fn unchanged<T>(slots: &BTreeMap<String, Slot<T>>, id: &str, decl: &DriverDecl) -> bool {
    slots.get(id).is_some_and(|slot| &slot.decl == decl)
}

fn merge<T>(
    declared: &BTreeMap<String, DriverDecl>,
    mut previous: BTreeMap<String, Slot<T>>,
    mut opened: BTreeMap<String, T>,
) -> BTreeMap<String, Slot<T>> {
    let mut merged = BTreeMap::new();
    for (id, decl) in declared {
        let slot = match opened.remove(id) {
            Some(handle) => Some(Slot {
                decl: decl.clone(),
                handle,
            }),
            None => previous.remove(id),
        };
        if let Some(slot) = slot {
            merged.insert(id.clone(), slot);
        }
    }
    merged
}

fn required(
    kind: &'static str,
    id: &str,
    decl: &DriverDecl,
    key: &'static str,
) -> Result<String, RouteError> {
    decl.option_or_positional(key)
        .map(str::to_owned)
        .ok_or_else(|| RouteError::MissingOption {
            kind,
            id: id.to_owned(),
            key,
        })
}

fn yes_no(
    kind: &'static str,
    id: &str,
    decl: &DriverDecl,
    key: &'static str,
) -> Result<Option<bool>, RouteError> {
    let Some(text) = decl.options.get(key) else {
        return Ok(None);
    };
    match text.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(Some(true)),
        "no" | "false" | "0" => Ok(Some(false)),
        _ => Err(RouteError::InvalidOption {
            kind,
            id: id.to_owned(),
            key,
            value: text.clone(),
        }),
    }
}

fn network_address(
    kind: &'static str,
    id: &str,
    decl: &DriverDecl,
) -> Result<(SocketAddr, bool), RouteError> {
    let invalid = |key: &'static str, value: &str| RouteError::InvalidOption {
        kind,
        id: id.to_owned(),
        key,
        value: value.to_owned(),
    };
    let ip_text = decl.options.get("ip").map_or(DEFAULT_IP, String::as_str);
    let ip: IpAddr = ip_text.parse().map_err(|_| invalid("ip", ip_text))?;
    let port_text = decl.options.get("port").ok_or_else(|| RouteError::MissingOption {
        kind,
        id: id.to_owned(),
        key: "port",
    })?;
    let port: u16 = port_text.parse().map_err(|_| invalid("port", port_text))?;
    let transport = decl.options.get("transport").map_or("tcp", String::as_str);
    let udp = match transport.to_ascii_lowercase().as_str() {
        "tcp" => false,
        "udp" => true,
        _ => return Err(invalid("transport", transport)),
    };
    Ok((SocketAddr::new(ip, port), udp))
}

fn open_source(id: &str, decl: &DriverDecl) -> Result<Source, RouteError> {
    const KIND: &str = "source";
    let opened = |source: io::Error| RouteError::Open {
        kind: KIND,
        id: id.to_owned(),
        source,
    };
    let handle = match decl.driver.as_str() {
        "file" => {
            let path = required(KIND, id, decl, "file_path")?;
            Source::File(FileTail::new(PathBuf::from(path)))
        }
        "wildcard-file" => {
            let base = required(KIND, id, decl, "base-dir")?;
            let pattern = decl
                .options
                .get("filename-pattern")
                .cloned()
                .unwrap_or_else(|| "*".to_owned());
            let recursive = yes_no(KIND, id, decl, "recursive")?.unwrap_or(false);
            let max_files = decl.options.get("max-files").map_or(Ok(DEFAULT_MAX_FILES), |text| {
                text.parse().map_err(|_| RouteError::InvalidOption {
                    kind: KIND,
                    id: id.to_owned(),
                    key: "max-files",
                    value: text.clone(),
                })
            })?;
            Source::Wildcard(
                WildcardTail::new(PathBuf::from(base), pattern)
                    .recursive(recursive)
                    .max_files(max_files),
            )
        }
        "network" => {
            let (address, udp) = network_address(KIND, id, decl)?;
            let pair = (address.ip(), address.port());
            if udp {
                Source::Udp(UdpIngress::bind(pair).map_err(opened)?)
            } else {
                Source::Tcp(TcpIngress::bind(pair).map_err(opened)?)
            }
        }
        "program" => Source::Program(
            ProgramIngress::spawn(&required(KIND, id, decl, "command")?).map_err(opened)?,
        ),
        "internal" => Source::Internal,
        other => {
            return Err(RouteError::UnsupportedDriver {
                kind: KIND,
                id: id.to_owned(),
                driver: other.to_owned(),
            });
        }
    };
    debug!(target: ROUTING_TARGET, id, driver = %decl.driver, "opened source");
    Ok(handle)
}

fn open_sink(id: &str, decl: &DriverDecl) -> Result<Sink, RouteError> {
    const KIND: &str = "destination";
    let opened = |source: io::Error| RouteError::Open {
        kind: KIND,
        id: id.to_owned(),
        source,
    };
    let handle = match decl.driver.as_str() {
        "file" => {
            let path = required(KIND, id, decl, "file_path")?;
            Sink::File(FileSink::open(PathBuf::from(path)).map_err(opened)?)
        }
        "network" => {
            let (address, udp) = network_address(KIND, id, decl)?;
            if udp {
                Sink::Udp(UdpSink::open(address).map_err(opened)?)
            } else {
                Sink::Tcp(TcpSink::new(address))
            }
        }
        "program" => Sink::Program(
            ProgramSink::spawn(&required(KIND, id, decl, "command")?).map_err(opened)?,
        ),
        other => {
            return Err(RouteError::UnsupportedDriver {
                kind: KIND,
                id: id.to_owned(),
                driver: other.to_owned(),
            });
        }
    };
    debug!(target: ROUTING_TARGET, id, driver = %decl.driver, "opened destination");
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::rstest;

    use super::*;
    use crate::grammar::parse;

    #[rstest]
    #[case("*.log", "a.log", true)]
    #[case("*.log", "a.txt", false)]
    #[case("in-?.log", "in-1.log", true)]
    #[case("in-?.log", "in-12.log", false)]
    #[case("*", "", true)]
    #[case("*.{log,txt}", "b.txt", true)]
    #[case("in-[12].log", "in-3.log", false)]
    #[case("*.log", "nested/a.log", false)]
    fn glob_patterns(#[case] pattern: &str, #[case] name: &str, #[case] expected: bool) {
        assert_eq!(filename_matches(pattern, name), expected);
    }

    fn file_config(dir: &std::path::Path, destinations: &[&str]) -> StubConfig {
        let mut text = format!(
            "source src_1 {{ file(\"{}\"); }};\n",
            dir.join("in.log").display()
        );
        for name in destinations {
            text.push_str(&format!(
                "destination {name} {{ file(\"{}\"); }};\n",
                dir.join(format!("{name}.log")).display()
            ));
        }
        text.push_str("log { source(src_1);");
        for name in destinations {
            text.push_str(&format!(" destination({name});"));
        }
        text.push_str(" };\n");
        parse(&text).expect("valid configuration")
    }

    #[test]
    fn reconfigure_keeps_offsets_of_unchanged_sources() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut router = Router::build(&file_config(dir.path(), &["dst_2"])).expect("build");
        fs::write(dir.path().join("in.log"), "first\n").expect("write");
        assert_eq!(router.pump(), 1);

        router
            .reconfigure(&file_config(dir.path(), &["dst_2", "dst_3"]))
            .expect("reconfigure");
        fs::write(dir.path().join("in.log"), "first\nsecond\n").expect("append");
        assert_eq!(router.pump(), 2);

        let kept = fs::read_to_string(dir.path().join("dst_2.log")).expect("dst_2");
        let added = fs::read_to_string(dir.path().join("dst_3.log")).expect("dst_3");
        assert_eq!(kept, "first\nsecond\n");
        assert_eq!(added, "second\n");
    }

    #[test]
    fn internal_messages_reach_internal_routes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let text = format!(
            "source s_internal {{ internal(); }};\ndestination d_internal {{ file(\"{}\"); }};\nlog {{ source(s_internal); destination(d_internal); }};\n",
            dir.path().join("internal.log").display()
        );
        let mut router = Router::build(&parse(&text).expect("parse")).expect("build");
        router.emit_internal("syslog-ng starting up");
        assert_eq!(router.pump(), 1);
        assert_eq!(router.pump(), 0);
    }

    fn wildcard_config(dir: &std::path::Path, extra: &str) -> StubConfig {
        let text = format!(
            "source s_dir {{ wildcard-file(base-dir(\"{}\") filename-pattern(\"*.log\"){extra}); }};\n\
             destination d_out {{ file(\"{}\"); }};\n\
             log {{ source(s_dir); destination(d_out); }};\n",
            dir.join("in").display(),
            dir.join("out.log").display()
        );
        parse(&text).expect("valid configuration")
    }

    #[test]
    fn wildcard_options_reach_the_directory_follower() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("in").join("nested");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(dir.path().join("in").join("a.log"), "top\n").expect("write");
        fs::write(nested.join("b.log"), "deep\n").expect("write");
        fs::write(nested.join("c.log"), "capped\n").expect("write");

        let config = wildcard_config(dir.path(), " recursive(yes) max-files(2)");
        let mut router = Router::build(&config).expect("build");
        assert_eq!(router.pump(), 2);
        let routed = fs::read_to_string(dir.path().join("out.log")).expect("out");
        assert_eq!(routed, "top\ndeep\n");
    }

    #[rstest]
    #[case::recursive(" recursive(maybe)")]
    #[case::max_files(" max-files(many)")]
    fn invalid_wildcard_options_are_rejected(#[case] extra: &str) {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = Router::build(&wildcard_config(dir.path(), extra)).expect_err("invalid option");
        assert!(matches!(error, RouteError::InvalidOption { .. }));
    }

    #[test]
    fn failed_reconfigure_leaves_routes_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut router = Router::build(&file_config(dir.path(), &["dst_2"])).expect("build");
        let broken = parse("destination d { kafka(topic(\"x\")); };").expect("parse");
        let error = router.reconfigure(&broken).expect_err("unsupported driver");
        assert!(matches!(error, RouteError::UnsupportedDriver { .. }));

        fs::write(dir.path().join("in.log"), "still routed\n").expect("write");
        assert_eq!(router.pump(), 1);
    }
}
