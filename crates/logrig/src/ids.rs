//! Identifier allocation for statements and log paths.

use std::fmt;

/// Kind of a configuration statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Message producer routed into log paths.
    Source,
    /// Message consumer fed by log paths.
    Destination,
}

impl StatementKind {
    /// Keyword used by the daemon grammar.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
        }
    }

    const fn id_prefix(self) -> &'static str {
        match self {
            Self::Source => "src",
            Self::Destination => "dst",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.keyword())
    }
}

/// Identifier of a source or destination statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(String);

impl StatementId {
    /// Wraps an arbitrary identifier, e.g. one copied from rendered text.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Identifier text as rendered in the configuration.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Identifier of a log path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogPathId(u64);

impl fmt::Display for LogPathId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "logpath_{}", self.0)
    }
}

/// Monotonic allocator shared by every identifier issued for one model.
///
/// Identifiers are never reused; a single counter spans statements and log
/// paths so the rendered text reflects creation order.
#[derive(Debug, Default)]
pub struct IdentifierAllocator {
    next: u64,
}

impl IdentifierAllocator {
    /// Creates an allocator starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    /// Issues the next statement identifier for `kind`.
    pub fn next_statement(&mut self, kind: StatementKind) -> StatementId {
        let serial = self.bump();
        StatementId(format!("{}_{serial}", kind.id_prefix()))
    }

    /// Issues the next log path identifier.
    pub fn next_logpath(&mut self) -> LogPathId {
        LogPathId(self.bump())
    }
}
