//! Serialisation of a model snapshot into daemon configuration text.
//!
//! Rendering is a pure function of the snapshot and the flags: statements
//! appear in creation order, log path references in list order, and option
//! keys in sorted order, so the same snapshot always yields the same bytes.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::ConfigError;
use crate::ids::{StatementId, StatementKind};
use crate::model::{LogPath, Statement};
use crate::options::{OptionMap, OptionValue};

const RENDER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::render");
const INDENT: &str = "    ";

/// Identifier of the implicit internal source.
pub const INTERNAL_SOURCE_ID: &str = "s_internal";
/// Identifier of the file destination fed by the internal source.
pub const INTERNAL_DESTINATION_ID: &str = "d_internal";

/// Which options each statement renders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderMode {
    /// Every resolved option.
    #[default]
    Full,
    /// Only options covering the driver's mandatory keys.
    MandatoryOnly,
}

/// Flags that select what a render includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderFlags {
    /// Emit the internal diagnostic route.
    pub use_internal_source: bool,
    /// Statement option selection.
    pub mode: RenderMode,
}

/// Borrowed view of everything a render reads.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    /// Value of the `@version:` header.
    pub version: &'a str,
    /// Global options.
    pub global_options: &'a OptionMap,
    /// Statements in creation order.
    pub statements: &'a [Statement],
    /// Log paths in creation order.
    pub logpaths: &'a [LogPath],
    /// File for the internal route; required when the route is rendered.
    pub internal_log: Option<&'a Path>,
}

/// Stateless renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigRenderer;

impl ConfigRenderer {
    /// Renders `snapshot`.
    ///
    /// All references are checked before any text is produced, so a failure
    /// never yields partial output.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DanglingReference`] when a log path names a
    /// statement missing from the table and [`ConfigError::KindMismatch`]
    /// when it names one in the wrong slot.
    pub fn render(snapshot: &Snapshot<'_>, flags: RenderFlags) -> Result<String, ConfigError> {
        let table: HashMap<&StatementId, &Statement> = snapshot
            .statements
            .iter()
            .map(|statement| (statement.id(), statement))
            .collect();
        for logpath in snapshot.logpaths {
            check_logpath(&table, logpath)?;
        }

        let mut text = String::new();
        push_line(&mut text, 0, &format!("@version: {}", snapshot.version));
        if !snapshot.global_options.is_empty() {
            text.push('\n');
            render_global_options(&mut text, snapshot.global_options);
        }
        if flags.use_internal_source {
            render_internal_route(&mut text, snapshot.internal_log);
        }
        for statement in snapshot.statements {
            text.push('\n');
            render_statement(&mut text, statement, flags.mode);
        }
        for logpath in snapshot.logpaths {
            text.push('\n');
            render_logpath(
                &mut text,
                logpath.source_statements.iter().map(StatementId::as_str),
                logpath.destination_statements.iter().map(StatementId::as_str),
            );
        }
        debug!(
            target: RENDER_TARGET,
            statements = snapshot.statements.len(),
            logpaths = snapshot.logpaths.len(),
            bytes = text.len(),
            "rendered configuration"
        );
        Ok(text)
    }
}

fn check_logpath(
    table: &HashMap<&StatementId, &Statement>,
    logpath: &LogPath,
) -> Result<(), ConfigError> {
    let slots = [
        (&logpath.source_statements, StatementKind::Source),
        (&logpath.destination_statements, StatementKind::Destination),
    ];
    for (ids, expected) in slots {
        for id in ids {
            let Some(statement) = table.get(id) else {
                return Err(ConfigError::DanglingReference {
                    logpath: logpath.id(),
                    kind: expected,
                    id: id.clone(),
                });
            };
            if statement.kind() != expected {
                return Err(ConfigError::KindMismatch {
                    id: id.clone(),
                    expected,
                    actual: statement.kind(),
                });
            }
        }
    }
    Ok(())
}

fn push_line(text: &mut String, depth: usize, line: &str) {
    for _ in 0..depth {
        text.push_str(INDENT);
    }
    text.push_str(line);
    text.push('\n');
}

fn render_global_options(text: &mut String, options: &OptionMap) {
    push_line(text, 0, "options {");
    for (key, value) in options.iter() {
        push_line(text, 1, &format!("{key}({value});"));
    }
    push_line(text, 0, "};");
}

fn render_internal_route(text: &mut String, internal_log: Option<&Path>) {
    text.push('\n');
    render_block(text, StatementKind::Source.keyword(), INTERNAL_SOURCE_ID, "internal()");
    if let Some(path) = internal_log {
        text.push('\n');
        let body = format!("file({})", OptionValue::from(path));
        render_block(
            text,
            StatementKind::Destination.keyword(),
            INTERNAL_DESTINATION_ID,
            &body,
        );
        text.push('\n');
        render_logpath(
            text,
            [INTERNAL_SOURCE_ID].into_iter(),
            [INTERNAL_DESTINATION_ID].into_iter(),
        );
    }
}

fn render_block(text: &mut String, keyword: &str, id: &str, body: &str) {
    push_line(text, 0, &format!("{keyword} {id} {{"));
    push_line(text, 1, &format!("{body};"));
    push_line(text, 0, "};");
}

fn render_statement(text: &mut String, statement: &Statement, mode: RenderMode) {
    let options = match mode {
        RenderMode::Full => statement.options(),
        RenderMode::MandatoryOnly => statement.connection_options(),
    };
    let mut arguments = Vec::with_capacity(options.len());
    if let Some(value) = statement.positional().and_then(|key| options.get(key)) {
        arguments.push(value.to_string());
    }
    for (key, value) in options.iter() {
        if Some(key) == statement.positional() {
            continue;
        }
        arguments.push(format!("{key}({value})"));
    }
    let body = format!("{}({})", statement.driver(), arguments.join(" "));
    render_block(text, statement.kind().keyword(), statement.id().as_str(), &body);
}

fn render_logpath<'a>(
    text: &mut String,
    sources: impl Iterator<Item = &'a str>,
    destinations: impl Iterator<Item = &'a str>,
) {
    push_line(text, 0, "log {");
    for id in sources {
        push_line(text, 1, &format!("source({id});"));
    }
    for id in destinations {
        push_line(text, 1, &format!("destination({id});"));
    }
    push_line(text, 0, "};");
}

#[cfg(test)]
mod tests;
