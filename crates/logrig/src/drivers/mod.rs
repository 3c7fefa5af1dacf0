//! Driver schemas and option resolution.
//!
//! Each driver is described by a static [`DriverSchema`]: the statement kinds
//! it supports, the option rendered positionally, the mandatory keys with the
//! generator that fills each one, the optional keys it accepts, and the rule
//! deriving a transport endpoint from the resolved options.

use std::net::IpAddr;
use std::path::PathBuf;

use tracing::debug;

use crate::context::TestContext;
use crate::error::ConfigError;
use crate::ids::StatementKind;
use crate::options::{OptionMap, OptionValue};
use crate::transport::{Endpoint, NetworkTransport};

const DRIVERS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::drivers");

/// Loopback address used for generated network endpoints.
pub const LOOPBACK: &str = "127.0.0.1";

/// How a missing mandatory option is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueGenerator {
    /// A fresh file path from the run's path registry.
    RegisteredFile,
    /// A fresh directory path from the run's path registry.
    RegisteredDir,
    /// A free loopback port.
    FreePort,
    /// A fixed text value.
    Literal(&'static str),
    /// A shell command bridging the program to a registered file.
    ProgramCommand,
}

/// A mandatory key and its generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MandatoryOption {
    /// Option key.
    pub key: &'static str,
    /// Generator used when the caller omits the key.
    pub generator: ValueGenerator,
}

/// Derivation of a transport endpoint from resolved options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRule {
    /// The driver has no harness-side endpoint.
    None,
    /// A single file named by `key`.
    File {
        /// Key holding the path.
        key: &'static str,
    },
    /// Files matching a pattern inside a directory.
    Directory {
        /// Key holding the directory.
        base: &'static str,
        /// Key holding the filename pattern.
        pattern: &'static str,
    },
    /// A loopback network address.
    Network {
        /// Key holding the address.
        ip: &'static str,
        /// Key holding the port.
        port: &'static str,
        /// Key holding `tcp` or `udp`.
        transport: &'static str,
    },
    /// The file bridged by a generated program command.
    ProgramFile,
}

/// Static description of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSchema {
    /// Driver name as written in the configuration.
    pub name: &'static str,
    /// Statement kinds the driver may be used for.
    pub kinds: &'static [StatementKind],
    /// Option rendered as a bare leading argument.
    pub positional: Option<&'static str>,
    /// Keys required for the statement to be instantiable.
    pub mandatory: &'static [MandatoryOption],
    /// Further keys the driver accepts.
    pub optional: &'static [&'static str],
    /// Endpoint derivation rule.
    pub endpoint: EndpointRule,
}

impl DriverSchema {
    /// Whether the driver supports `kind`.
    #[must_use]
    pub fn supports(&self, kind: StatementKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Whether `key` is one of the driver's mandatory keys.
    #[must_use]
    pub fn is_mandatory(&self, key: &str) -> bool {
        self.mandatory.iter().any(|option| option.key == key)
    }

    /// Whether `key` is mandatory or optional for the driver.
    #[must_use]
    pub fn is_known(&self, key: &str) -> bool {
        self.is_mandatory(key) || self.optional.contains(&key)
    }
}

const BOTH: &[StatementKind] = &[StatementKind::Source, StatementKind::Destination];
const SOURCE_ONLY: &[StatementKind] = &[StatementKind::Source];

const FILE: DriverSchema = DriverSchema {
    name: "file",
    kinds: BOTH,
    positional: Some("file_path"),
    mandatory: &[MandatoryOption {
        key: "file_path",
        generator: ValueGenerator::RegisteredFile,
    }],
    optional: &[
        "flags",
        "follow-freq",
        "create-dirs",
        "template",
        "encoding",
        "log-fetch-limit",
    ],
    endpoint: EndpointRule::File { key: "file_path" },
};

const WILDCARD_FILE: DriverSchema = DriverSchema {
    name: "wildcard-file",
    kinds: SOURCE_ONLY,
    positional: None,
    mandatory: &[
        MandatoryOption {
            key: "base-dir",
            generator: ValueGenerator::RegisteredDir,
        },
        MandatoryOption {
            key: "filename-pattern",
            generator: ValueGenerator::Literal("*.log"),
        },
    ],
    optional: &[
        "recursive",
        "max-files",
        "flags",
        "follow-freq",
        "log-fetch-limit",
    ],
    endpoint: EndpointRule::Directory {
        base: "base-dir",
        pattern: "filename-pattern",
    },
};

const NETWORK: DriverSchema = DriverSchema {
    name: "network",
    kinds: BOTH,
    positional: None,
    mandatory: &[
        MandatoryOption {
            key: "ip",
            generator: ValueGenerator::Literal(LOOPBACK),
        },
        MandatoryOption {
            key: "port",
            generator: ValueGenerator::FreePort,
        },
        MandatoryOption {
            key: "transport",
            generator: ValueGenerator::Literal("tcp"),
        },
    ],
    optional: &[
        "flags",
        "template",
        "keep-alive",
        "max-connections",
        "log-fetch-limit",
    ],
    endpoint: EndpointRule::Network {
        ip: "ip",
        port: "port",
        transport: "transport",
    },
};

const PROGRAM: DriverSchema = DriverSchema {
    name: "program",
    kinds: BOTH,
    positional: Some("command"),
    mandatory: &[MandatoryOption {
        key: "command",
        generator: ValueGenerator::ProgramCommand,
    }],
    optional: &["flags", "template", "keep-alive", "inherit-environment"],
    endpoint: EndpointRule::ProgramFile,
};

const INTERNAL: DriverSchema = DriverSchema {
    name: "internal",
    kinds: SOURCE_ONLY,
    positional: None,
    mandatory: &[],
    optional: &[],
    endpoint: EndpointRule::None,
};

const BUILTIN: &[DriverSchema] = &[FILE, WILDCARD_FILE, NETWORK, PROGRAM, INTERNAL];

/// Options produced by [`DriverCatalog::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
    /// Every option the statement renders in full mode.
    pub options: OptionMap,
    /// The subset of `options` covering mandatory keys.
    pub connection_options: OptionMap,
    /// Harness-side endpoint, when one can be derived.
    pub endpoint: Option<Endpoint>,
}

/// Lookup table from driver name to schema.
#[derive(Debug, Clone)]
pub struct DriverCatalog {
    schemas: Vec<DriverSchema>,
}

impl Default for DriverCatalog {
    fn default() -> Self {
        Self {
            schemas: BUILTIN.to_vec(),
        }
    }
}

impl DriverCatalog {
    /// Catalog holding the built-in drivers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a schema.
    pub fn register(&mut self, schema: DriverSchema) {
        self.schemas.retain(|existing| existing.name != schema.name);
        self.schemas.push(schema);
    }

    /// Looks up `driver`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownDriver`] when no schema has that name.
    pub fn schema(&self, driver: &str) -> Result<&DriverSchema, ConfigError> {
        self.schemas
            .iter()
            .find(|schema| schema.name == driver)
            .ok_or_else(|| ConfigError::UnknownDriver {
                driver: driver.to_owned(),
            })
    }

    /// Resolves the options of a new statement.
    ///
    /// With `use_mandatory_options` every mandatory key the caller omitted is
    /// generated, caller values win for keys they supply, and caller keys the
    /// schema does not list are rejected. Without it the caller's options are
    /// used as given, even if incomplete or unknown to the schema.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownDriver`] or
    /// [`ConfigError::UnsupportedKind`] for an invalid driver,
    /// [`ConfigError::UnknownOption`] for an unlisted key, and
    /// [`ConfigError::Resource`] when a generated port cannot be reserved.
    pub fn resolve(
        &self,
        context: &mut TestContext,
        driver: &str,
        kind: StatementKind,
        user_options: &OptionMap,
        use_mandatory_options: bool,
    ) -> Result<ResolvedOptions, ConfigError> {
        let schema = self.schema(driver)?;
        if !schema.supports(kind) {
            return Err(ConfigError::UnsupportedKind {
                driver: driver.to_owned(),
                kind,
            });
        }
        let mut options = OptionMap::new();
        let mut bridged = None;
        if use_mandatory_options {
            if let Some((key, _)) = user_options.iter().find(|(key, _)| !schema.is_known(key)) {
                return Err(ConfigError::UnknownOption {
                    driver: driver.to_owned(),
                    key: key.to_owned(),
                });
            }
            for mandatory in schema.mandatory {
                if user_options.contains_key(mandatory.key) {
                    continue;
                }
                let generated = generate(context, schema, kind, mandatory.generator, &mut bridged)?;
                debug!(
                    target: DRIVERS_TARGET,
                    driver,
                    key = mandatory.key,
                    value = %generated,
                    "generated mandatory option"
                );
                options.insert(mandatory.key, generated);
            }
        }
        options.merge(user_options);
        let connection_options = options.filtered(|key| schema.is_mandatory(key));
        let endpoint = derive_endpoint(schema.endpoint, &options, bridged);
        Ok(ResolvedOptions {
            options,
            connection_options,
            endpoint,
        })
    }
}

fn generate(
    context: &mut TestContext,
    schema: &DriverSchema,
    kind: StatementKind,
    generator: ValueGenerator,
    bridged: &mut Option<PathBuf>,
) -> Result<OptionValue, ConfigError> {
    let prefix = format!("{}_{}", schema.name, kind.keyword());
    let value = match generator {
        ValueGenerator::RegisteredFile => {
            OptionValue::Path(context.paths_mut().get_registered_file_path(&prefix))
        }
        ValueGenerator::RegisteredDir => {
            OptionValue::Path(context.paths_mut().get_registered_dir_path(&prefix))
        }
        ValueGenerator::FreePort => OptionValue::from(context.allocate_port()?),
        ValueGenerator::Literal(text) => OptionValue::from(text),
        ValueGenerator::ProgramCommand => {
            let path = context.paths_mut().get_registered_file_path(&prefix);
            let command = program_command(kind, &path);
            *bridged = Some(path);
            OptionValue::Text(command)
        }
    };
    Ok(value)
}

/// Shell command bridging a program statement to `path`.
///
/// A program source emits the lines appended to `path`; a program
/// destination appends what it receives to `path`.
#[must_use]
pub fn program_command(kind: StatementKind, path: &std::path::Path) -> String {
    let quoted = path.display().to_string().replace('\'', r"'\''");
    match kind {
        StatementKind::Source => format!("tail -F -n +1 '{quoted}'"),
        StatementKind::Destination => format!("cat >> '{quoted}'"),
    }
}

fn derive_endpoint(
    rule: EndpointRule,
    options: &OptionMap,
    bridged: Option<PathBuf>,
) -> Option<Endpoint> {
    match rule {
        EndpointRule::None => None,
        EndpointRule::File { key } => options
            .get(key)
            .and_then(OptionValue::as_path)
            .map(|path| Endpoint::File(path.to_path_buf())),
        EndpointRule::Directory { base, pattern } => {
            let base = options.get(base).and_then(OptionValue::as_path)?;
            let pattern = options.get(pattern).and_then(OptionValue::as_text)?;
            Some(Endpoint::Directory {
                base: base.to_path_buf(),
                pattern: pattern.to_owned(),
            })
        }
        EndpointRule::Network {
            ip,
            port,
            transport,
        } => {
            let ip = options
                .get(ip)
                .and_then(OptionValue::as_text)
                .unwrap_or(LOOPBACK)
                .parse::<IpAddr>()
                .ok()?;
            let port = options.get(port).and_then(OptionValue::as_port)?;
            let transport = match options.get(transport).and_then(OptionValue::as_text) {
                Some(text) => NetworkTransport::parse(text)?,
                None => NetworkTransport::Tcp,
            };
            Some(Endpoint::Network {
                ip,
                port,
                transport,
            })
        }
        EndpointRule::ProgramFile => bridged.map(Endpoint::File),
    }
}

#[cfg(test)]
mod tests;
