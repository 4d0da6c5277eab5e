//! HTTP error taxonomy: named error types, the registry cataloging them, and
//! the [`HttpError`] value handlers raise.
//!
//! # Resolution
//!
//! An [`ErrorSelector`] picks a type out of the registry either by symbolic
//! name or by numeric code. Name lookups are exact and fall back to the
//! reserved `default` type when the name is unknown; code lookups return the
//! first registered type carrying that code and synthesize a nameless type
//! when none does. The registry seeds a fixed set of built-in types at
//! construction, which callers may extend or shadow.
//!
//! # Body rendering
//!
//! [`ErrorBodyMode`] controls what an error looks like on the wire: the full
//! `{code, type, message}` record as JSON, the symbolic name only, or the
//! human message only.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named, coded error definition.
///
/// `name` is the unique registry key (serialized as `type`); `message` is an
/// optional human-readable description included in object and message body
/// renderings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorType {
    /// HTTP status code rendered for this error.
    pub code: u16,
    /// Unique symbolic name.
    #[serde(rename = "type")]
    pub name: String,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorType {
    /// Creates a type with no message.
    #[must_use]
    pub fn new(code: u16, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            message: None,
        }
    }

    /// Sets the message, builder-style.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Picks an [`ErrorType`] out of the registry by name or numeric code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorSelector {
    /// First registered type with this code.
    Code(u16),
    /// Exact name lookup, falling back to `default` on a miss.
    Name(String),
}

impl From<u16> for ErrorSelector {
    fn from(code: u16) -> Self {
        Self::Code(code)
    }
}

impl From<&str> for ErrorSelector {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ErrorSelector {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// How an error is rendered into a response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorBodyMode {
    /// The full `{code, type, message}` record as JSON, message omitted when
    /// absent.
    Object,
    /// The symbolic type name only.
    #[default]
    Type,
    /// The human message only, empty when the type carries none.
    Message,
}

impl ErrorBodyMode {
    /// Renders `error_type` into a response body under this mode.
    #[must_use]
    pub fn render(self, error_type: &ErrorType) -> String {
        match self {
            Self::Object => serde_json::to_string(error_type)
                .unwrap_or_else(|_| error_type.name.clone()),
            Self::Type => error_type.name.clone(),
            Self::Message => error_type.message.clone().unwrap_or_default(),
        }
    }
}

/// Registering a name that already exists without opting into overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error type {name:?} is already registered")]
pub struct DuplicateErrorType {
    /// The conflicting symbolic name.
    pub name: String,
}

/// Catalog of [`ErrorType`]s, keyed by name, preserving registration order
/// for code lookups.
///
/// Built once during startup and read-only while serving.
#[derive(Debug, Clone)]
pub struct ErrorRegistry {
    types: Vec<ErrorType>,
    by_name: HashMap<String, usize>,
}

impl ErrorRegistry {
    /// Creates a registry seeded with the built-in types: `timeout` (408),
    /// `default` (500), `internal_error` (500), `not_found` (404),
    /// `unauthorized` (403), `malformed_query` (400), `already_exists` (409),
    /// `token_expired` (410), and `wrong_credentials` (401).
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            types: Vec::new(),
            by_name: HashMap::new(),
        };
        for error_type in builtin_types() {
            // Seeding an empty registry; names are distinct by construction.
            let _ = registry.add_type(error_type, false);
        }
        registry
    }

    /// Adds `error_type` to the catalog.
    ///
    /// Fails with [`DuplicateErrorType`] if the name is taken and `overwrite`
    /// is false. With `overwrite`, the existing entry is replaced in place so
    /// code-lookup order is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateErrorType`] on a name collision without overwrite.
    pub fn add_type(
        &mut self,
        error_type: ErrorType,
        overwrite: bool,
    ) -> Result<(), DuplicateErrorType> {
        if let Some(&index) = self.by_name.get(&error_type.name) {
            if !overwrite {
                return Err(DuplicateErrorType {
                    name: error_type.name,
                });
            }
            tracing::debug!(name = %error_type.name, "overwriting registered error type");
            self.types[index] = error_type;
        } else {
            self.by_name
                .insert(error_type.name.clone(), self.types.len());
            self.types.push(error_type);
        }
        Ok(())
    }

    /// Returns the type registered under `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ErrorType> {
        self.by_name.get(name).map(|&index| &self.types[index])
    }

    /// Returns the reserved `default` type.
    #[must_use]
    pub fn default_type(&self) -> ErrorType {
        self.get("default")
            .cloned()
            .unwrap_or_else(|| ErrorType::new(500, "default"))
    }

    /// Resolves a selector to a concrete type.
    ///
    /// `None` and unknown names yield the `default` type; an unknown code
    /// yields a synthetic nameless type carrying that code.
    #[must_use]
    pub fn resolve(&self, selector: Option<&ErrorSelector>) -> ErrorType {
        match selector {
            None => self.default_type(),
            Some(ErrorSelector::Name(name)) => self
                .get(name)
                .cloned()
                .unwrap_or_else(|| self.default_type()),
            Some(ErrorSelector::Code(code)) => self
                .types
                .iter()
                .find(|error_type| error_type.code == *code)
                .cloned()
                .unwrap_or_else(|| ErrorType::new(*code, "")),
        }
    }
}

impl Default for ErrorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_types() -> Vec<ErrorType> {
    vec![
        ErrorType::new(408, "timeout")
            .with_message("The connection was interrupted or has timed out"),
        ErrorType::new(500, "default").with_message("An unknown error has been thrown"),
        ErrorType::new(500, "internal_error").with_message("An internal error has occurred"),
        ErrorType::new(404, "not_found")
            .with_message("The requested resource hasn't been found"),
        ErrorType::new(403, "unauthorized"),
        ErrorType::new(400, "malformed_query"),
        ErrorType::new(409, "already_exists")
            .with_message("A resource with the same key already exists"),
        ErrorType::new(410, "token_expired"),
        ErrorType::new(401, "wrong_credentials"),
    ]
}

/// The typed error value raised by handlers, wrapping a resolved
/// [`ErrorType`] with an optional per-instance message override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    error_type: ErrorType,
}

impl HttpError {
    /// Wraps an error type.
    #[must_use]
    pub fn new(error_type: ErrorType) -> Self {
        Self { error_type }
    }

    /// Overrides the carried message, builder-style.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_type.message = Some(message.into());
        self
    }

    /// The carried error type.
    #[must_use]
    pub fn error_type(&self) -> &ErrorType {
        &self.error_type
    }

    /// HTTP status code of this error.
    #[must_use]
    pub fn code(&self) -> u16 {
        self.error_type.code
    }

    /// Symbolic name, empty for synthetic code-only types.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.error_type.name
    }

    /// The message, if the type carries one.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.error_type.message.as_deref()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.error_type.code)?;
        if !self.error_type.name.is_empty() {
            write!(f, " [{}]", self.error_type.name)?;
        }
        if let Some(message) = &self.error_type.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpError {}
