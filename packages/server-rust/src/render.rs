//! Error rendering policy: registry, body mode, and production gating.

use std::sync::Arc;

use switchyard_core::{ErrorBodyMode, ErrorRegistry, ErrorType, HttpError};

/// Turns [`HttpError`]s into wire responses.
///
/// Shared between the dispatch loop (boundary errors) and every
/// [`RequestEvent`](crate::event::RequestEvent) (handler-side `fail`).
pub struct ErrorRenderer {
    registry: Arc<ErrorRegistry>,
    body_mode: ErrorBodyMode,
    production: bool,
}

impl ErrorRenderer {
    /// Creates a renderer over `registry` with the configured body mode.
    #[must_use]
    pub fn new(registry: Arc<ErrorRegistry>, body_mode: ErrorBodyMode, production: bool) -> Self {
        Self {
            registry,
            body_mode,
            production,
        }
    }

    /// Renders a typed error into status and body.
    #[must_use]
    pub fn render(&self, error: &HttpError) -> (u16, String) {
        (error.code(), self.body_mode.render(error.error_type()))
    }

    /// Builds the `internal_error` value for an untyped failure.
    ///
    /// The error chain lands in the message only outside production mode; in
    /// production the registered type's own message is all a client sees.
    #[must_use]
    pub fn internal(&self, error: &anyhow::Error) -> HttpError {
        let base = HttpError::new(
            self.registry
                .get("internal_error")
                .cloned()
                .unwrap_or_else(|| ErrorType::new(500, "internal_error")),
        );
        if self.production {
            base
        } else {
            base.with_message(format!("{error:#}"))
        }
    }
}
