//! Log severity selection for HTTP errors.
//!
//! A [`LogFilterResolver`] holds an ordered list of declarative rules mapping
//! errors onto log severities. Rules are evaluated last-declared-first: the
//! most recently declared rule whose predicates all hold decides the level,
//! regardless of how specific earlier rules are. An error matched by no rule
//! logs at [`LogLevel::Error`].

use serde::{Deserialize, Serialize};

/// Log severity, from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warn,
    Error,
}

/// One declarative severity rule.
///
/// A rule matches an error when every predicate it specifies holds; a rule
/// with no predicates matches every error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilterRule {
    /// Exact status code to match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    /// Exact symbolic name to match.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Status class to match: one of 100, 200, 300, 400, 500.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<u16>,
    /// Severity applied to matching errors.
    pub level: LogLevel,
}

impl LogFilterRule {
    /// Rule matching an exact status code.
    #[must_use]
    pub fn for_code(code: u16, level: LogLevel) -> Self {
        Self {
            code: Some(code),
            name: None,
            range: None,
            level,
        }
    }

    /// Rule matching an exact symbolic name.
    #[must_use]
    pub fn for_name(name: impl Into<String>, level: LogLevel) -> Self {
        Self {
            code: None,
            name: Some(name.into()),
            range: None,
            level,
        }
    }

    /// Rule matching a whole status class (the code rounded down to its
    /// hundred).
    #[must_use]
    pub fn for_range(range: u16, level: LogLevel) -> Self {
        Self {
            code: None,
            name: None,
            range: Some(range),
            level,
        }
    }

    fn matches(&self, code: u16, name: &str) -> bool {
        if let Some(expected) = self.code {
            if code != expected {
                return false;
            }
        }
        if let Some(expected) = &self.name {
            if name != expected {
                return false;
            }
        }
        if let Some(expected) = self.range {
            if code / 100 * 100 != expected {
                return false;
            }
        }
        true
    }
}

/// Ordered rule list with last-declared-wins resolution.
#[derive(Debug, Clone, Default)]
pub struct LogFilterResolver {
    rules: Vec<LogFilterRule>,
}

impl LogFilterResolver {
    /// Creates a resolver over `rules`, kept in declaration order.
    #[must_use]
    pub fn new(rules: Vec<LogFilterRule>) -> Self {
        Self { rules }
    }

    /// Picks the severity for an error identified by `code` and `name`.
    ///
    /// Scans the rules from the end of the declared list and returns the
    /// level of the first match; [`LogLevel::Error`] when nothing matches.
    #[must_use]
    pub fn resolve(&self, code: u16, name: &str) -> LogLevel {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(code, name))
            .map_or(LogLevel::Error, |rule| rule.level)
    }
}
