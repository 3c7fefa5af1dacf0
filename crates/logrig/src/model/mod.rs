//! In-memory configuration graph.
//!
//! [`ConfigModel`] owns the global options, the statement table and the log
//! paths of one test. Statements are never removed; regenerating only changes
//! the rendered text, so identifiers and the caller-held transport handles
//! stay valid across reloads.

mod property;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::context::TestContext;
use crate::drivers::DriverCatalog;
use crate::error::ConfigError;
use crate::ids::{IdentifierAllocator, LogPathId, StatementId, StatementKind};
use crate::options::OptionMap;
use crate::render::{ConfigRenderer, RenderFlags, RenderMode, Snapshot};
use crate::transport::{self, ListenerTiming};

pub use property::DriverProperty;

const MODEL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::model");

/// A source or destination declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    id: StatementId,
    kind: StatementKind,
    driver: String,
    positional: Option<&'static str>,
    options: OptionMap,
    connection_options: OptionMap,
}

impl Statement {
    /// Statement identifier.
    #[must_use]
    pub const fn id(&self) -> &StatementId {
        &self.id
    }

    /// Statement kind.
    #[must_use]
    pub const fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Driver name.
    #[must_use]
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Key rendered as the driver's leading bare argument.
    #[must_use]
    pub const fn positional(&self) -> Option<&'static str> {
        self.positional
    }

    /// Every resolved option.
    #[must_use]
    pub const fn options(&self) -> &OptionMap {
        &self.options
    }

    /// Resolved options covering the driver's mandatory keys.
    #[must_use]
    pub const fn connection_options(&self) -> &OptionMap {
        &self.connection_options
    }
}

/// Routing rule from a set of sources to a set of destinations.
///
/// Both lists may be appended to after creation; the change takes effect on
/// the next generation, which is also where references are validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPath {
    id: LogPathId,
    /// Sources feeding the path, in render order.
    pub source_statements: Vec<StatementId>,
    /// Destinations fed by the path, in render order.
    pub destination_statements: Vec<StatementId>,
}

impl LogPath {
    /// Log path identifier.
    #[must_use]
    pub const fn id(&self) -> LogPathId {
        self.id
    }
}

/// Flags accepted by [`ConfigModel::generate_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Include the implicit internal diagnostic route.
    pub use_internal_source: bool,
    /// Supersede a previous generation instead of failing.
    pub re_create_config: bool,
    /// Which options each statement renders.
    pub mode: RenderMode,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            use_internal_source: true,
            re_create_config: false,
            mode: RenderMode::Full,
        }
    }
}

impl GenerateOptions {
    /// Options for regenerating an already generated model.
    #[must_use]
    pub fn regenerate() -> Self {
        Self {
            re_create_config: true,
            ..Self::default()
        }
    }

    /// Returns a copy with the internal route toggled.
    #[must_use]
    pub fn with_internal_source(mut self, enabled: bool) -> Self {
        self.use_internal_source = enabled;
        self
    }

    /// Returns a copy using `mode`.
    #[must_use]
    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Configuration graph for one test.
#[derive(Debug, Default)]
pub struct ConfigModel {
    ids: IdentifierAllocator,
    catalog: DriverCatalog,
    global_options: OptionMap,
    statements: Vec<Statement>,
    index: HashMap<StatementId, usize>,
    logpaths: Vec<LogPath>,
    internal_log: Option<PathBuf>,
    generations: u32,
}

impl ConfigModel {
    /// Empty model using the built-in driver catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty model using `catalog`.
    #[must_use]
    pub fn with_catalog(catalog: DriverCatalog) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    /// Merges `options` into the global options; later writes win per key.
    pub fn add_global_options(&mut self, options: &OptionMap) {
        debug!(target: MODEL_TARGET, count = options.len(), "merging global options");
        self.global_options.merge(options);
    }

    /// Current global options.
    #[must_use]
    pub const fn global_options(&self) -> &OptionMap {
        &self.global_options
    }

    /// Declares a source statement and binds its writer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unknown or unsupported driver, when a
    /// generated resource cannot be issued, or when the transport cannot bind.
    pub fn create_source(
        &mut self,
        context: &mut TestContext,
        driver: &str,
        driver_options: &OptionMap,
        use_mandatory_options: bool,
    ) -> Result<(StatementId, DriverProperty), ConfigError> {
        self.create_statement(
            context,
            StatementKind::Source,
            driver,
            driver_options,
            use_mandatory_options,
        )
    }

    /// Declares a destination statement and binds its listener.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unknown or unsupported driver, when a
    /// generated resource cannot be issued, or when the transport cannot bind.
    pub fn create_destination(
        &mut self,
        context: &mut TestContext,
        driver: &str,
        driver_options: &OptionMap,
        use_mandatory_options: bool,
    ) -> Result<(StatementId, DriverProperty), ConfigError> {
        self.create_statement(
            context,
            StatementKind::Destination,
            driver,
            driver_options,
            use_mandatory_options,
        )
    }

    fn create_statement(
        &mut self,
        context: &mut TestContext,
        kind: StatementKind,
        driver: &str,
        driver_options: &OptionMap,
        use_mandatory_options: bool,
    ) -> Result<(StatementId, DriverProperty), ConfigError> {
        let resolved = self.catalog.resolve(
            context,
            driver,
            kind,
            driver_options,
            use_mandatory_options,
        )?;
        let timing = ListenerTiming {
            default_wait: context.settings().receive_timeout(),
            poll_interval: context.settings().poll_interval(),
        };
        let binding = transport::bind(kind, resolved.endpoint.as_ref(), timing)?;
        let positional = self.catalog.schema(driver)?.positional;
        let id = self.ids.next_statement(kind);
        info!(
            target: MODEL_TARGET,
            id = %id,
            %kind,
            driver,
            options = resolved.options.len(),
            "created statement"
        );
        self.index.insert(id.clone(), self.statements.len());
        self.statements.push(Statement {
            id: id.clone(),
            kind,
            driver: driver.to_owned(),
            positional,
            options: resolved.options,
            connection_options: resolved.connection_options.clone(),
        });
        let property = DriverProperty::new(
            id.clone(),
            kind,
            resolved.connection_options,
            resolved.endpoint,
            binding,
        );
        Ok((id, property))
    }

    /// Looks up a statement.
    #[must_use]
    pub fn statement(&self, id: &StatementId) -> Option<&Statement> {
        self.index.get(id).and_then(|position| self.statements.get(*position))
    }

    /// Statements in creation order.
    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Creates a log path after checking every reference.
    ///
    /// The returned identifier gives mutable access through
    /// [`ConfigModel::logpath_mut`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownStatement`] for an identifier the model
    /// never issued and [`ConfigError::KindMismatch`] for one in the wrong
    /// slot.
    pub fn connect_statements_in_logpath(
        &mut self,
        source_ids: &[StatementId],
        destination_ids: &[StatementId],
    ) -> Result<LogPathId, ConfigError> {
        for (ids, expected) in [
            (source_ids, StatementKind::Source),
            (destination_ids, StatementKind::Destination),
        ] {
            for id in ids {
                self.check_reference(id, expected)?;
            }
        }
        let id = self.ids.next_logpath();
        info!(
            target: MODEL_TARGET,
            logpath = %id,
            sources = source_ids.len(),
            destinations = destination_ids.len(),
            "connected statements"
        );
        self.logpaths.push(LogPath {
            id,
            source_statements: source_ids.to_vec(),
            destination_statements: destination_ids.to_vec(),
        });
        Ok(id)
    }

    fn check_reference(&self, id: &StatementId, expected: StatementKind) -> Result<(), ConfigError> {
        let statement = self
            .statement(id)
            .ok_or_else(|| ConfigError::UnknownStatement { id: id.clone() })?;
        if statement.kind != expected {
            return Err(ConfigError::KindMismatch {
                id: id.clone(),
                expected,
                actual: statement.kind,
            });
        }
        Ok(())
    }

    /// Mutable access to a log path.
    pub fn logpath_mut(&mut self, id: LogPathId) -> Option<&mut LogPath> {
        self.logpaths.iter_mut().find(|logpath| logpath.id == id)
    }

    /// Read access to a log path.
    #[must_use]
    pub fn logpath(&self, id: LogPathId) -> Option<&LogPath> {
        self.logpaths.iter().find(|logpath| logpath.id == id)
    }

    /// Log paths in creation order.
    #[must_use]
    pub fn logpaths(&self) -> &[LogPath] {
        &self.logpaths
    }

    /// File receiving the daemon's internal messages, once generated.
    #[must_use]
    pub fn internal_log_path(&self) -> Option<&Path> {
        self.internal_log.as_deref()
    }

    /// Number of successful generations.
    #[must_use]
    pub const fn generations(&self) -> u32 {
        self.generations
    }

    /// Renders the current graph without recording a generation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DanglingReference`] or
    /// [`ConfigError::KindMismatch`] when a mutated log path no longer
    /// matches the statement table.
    pub fn render(&self, version: &str, flags: RenderFlags) -> Result<String, ConfigError> {
        let snapshot = Snapshot {
            version,
            global_options: &self.global_options,
            statements: &self.statements,
            logpaths: &self.logpaths,
            internal_log: self.internal_log.as_deref(),
        };
        ConfigRenderer::render(&snapshot, flags)
    }

    /// Renders the configuration and writes it to the run's config path.
    ///
    /// A first generation must not pass `re_create_config`; any later one
    /// must. The text is returned as well as written.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AlreadyGenerated`] for a duplicate first
    /// generation, render errors, and [`ConfigError::WriteConfig`] when the
    /// file cannot be written.
    pub fn generate_config(
        &mut self,
        context: &mut TestContext,
        options: GenerateOptions,
    ) -> Result<String, ConfigError> {
        if !options.re_create_config && self.generations > 0 {
            return Err(ConfigError::AlreadyGenerated);
        }
        if options.use_internal_source && self.internal_log.is_none() {
            self.internal_log = Some(context.get_registered_file_path("internal"));
        }
        let flags = RenderFlags {
            use_internal_source: options.use_internal_source,
            mode: options.mode,
        };
        let text = self.render(context.settings().config_version(), flags)?;
        let path = context.config_path();
        fs::write(&path, &text).map_err(|source| ConfigError::WriteConfig {
            path: path.clone(),
            source,
        })?;
        self.generations += 1;
        info!(
            target: MODEL_TARGET,
            file = %path.display(),
            generation = self.generations,
            internal = options.use_internal_source,
            "generated configuration"
        );
        Ok(text)
    }
}
