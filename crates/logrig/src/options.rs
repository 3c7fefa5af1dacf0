//! Typed driver and global option values.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A single option value as the daemon grammar understands it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Free text, rendered quoted.
    Text(String),
    /// Integer, rendered bare.
    Number(i64),
    /// Boolean, rendered as `yes`/`no`.
    Flag(bool),
    /// Filesystem path, rendered quoted.
    Path(PathBuf),
    /// Verbatim token such as `no-parse`.
    Raw(String),
}

impl OptionValue {
    /// Returns the value as a path when it carries one.
    #[must_use]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path.as_path()),
            Self::Text(text) => Some(Path::new(text.as_str())),
            _ => None,
        }
    }

    /// Returns the value as text when it is textual.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::Raw(text) => Some(text.as_str()),
            Self::Path(path) => path.to_str(),
            Self::Number(_) | Self::Flag(_) => None,
        }
    }

    /// Returns the value as a port number when it fits.
    #[must_use]
    pub fn as_port(&self) -> Option<u16> {
        match self {
            Self::Number(number) => u16::try_from(*number).ok(),
            Self::Text(text) | Self::Raw(text) => text.trim().parse().ok(),
            Self::Flag(_) | Self::Path(_) => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write_quoted(formatter, text),
            Self::Number(number) => write!(formatter, "{number}"),
            Self::Flag(true) => formatter.write_str("yes"),
            Self::Flag(false) => formatter.write_str("no"),
            Self::Path(path) => write_quoted(formatter, &path.to_string_lossy()),
            Self::Raw(raw) => formatter.write_str(raw),
        }
    }
}

fn write_quoted(formatter: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    formatter.write_str("\"")?;
    for character in text.chars() {
        match character {
            '"' => formatter.write_str("\\\"")?,
            '\\' => formatter.write_str("\\\\")?,
            '\n' => formatter.write_str("\\n")?,
            other => write!(formatter, "{other}")?,
        }
    }
    formatter.write_str("\"")
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<u16> for OptionValue {
    fn from(value: u16) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<PathBuf> for OptionValue {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OptionValue {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

/// Key/value options with unique keys and a stable iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionMap {
    entries: BTreeMap<String, OptionValue>,
}

impl OptionMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Builder form of [`OptionMap::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Looks up `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries.get(key)
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<OptionValue> {
        self.entries.remove(key)
    }

    /// Copies every entry of `other` over this map; later writes win.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Keeps only the entries whose key satisfies `keep`.
    #[must_use]
    pub fn filtered(&self, keep: impl Fn(&str) -> bool) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(key, _)| keep(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self { entries }
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for OptionMap
where
    K: Into<String>,
    V: Into<OptionValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self { entries }
    }
}
