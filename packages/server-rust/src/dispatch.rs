//! The dispatch loop tying routing, handlers, and error rendering together.
//!
//! Each request moves through `Received -> Routed -> {Handled | Errored |
//! TimedOut} -> Closed`. Routing misses become the configured default error,
//! method misses a 405; handler execution races a timeout, with the losing
//! side's write rejected by the event's state machine. Every error is caught
//! here; nothing propagates past the loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use switchyard_core::{
    ErrorRegistry, ErrorSelector, ErrorType, HttpError, LogFilterResolver, RouteTable,
};

use crate::config::ServerConfig;
use crate::event::{EventError, RawRequest, RequestEvent, ResponseSink};
use crate::handler::{Handler, HandlerError};
use crate::logging::{Logger, TracingLogger};
use crate::render::ErrorRenderer;

// ---------------------------------------------------------------------------
// DispatchOutcome
// ---------------------------------------------------------------------------

/// Terminal outcome of one dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler ran to completion.
    Handled,
    /// No route matched the path.
    NotFound,
    /// The route exists but does not serve the method.
    MethodNotAllowed,
    /// Routing or the handler raised an error.
    Errored,
    /// The handler exceeded the configured timeout.
    TimedOut,
}

impl DispatchOutcome {
    /// Stable lowercase label for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::NotFound => "not_found",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::Errored => "errored",
            Self::TimedOut => "timed_out",
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Routes requests to handlers and resolves every response exactly once.
///
/// Built once from a finished [`RouteTable`] and a [`ServerConfig`];
/// read-only while serving, so dispatch cycles share it behind an [`Arc`]
/// without locking.
pub struct Dispatcher {
    routes: RouteTable<Handler>,
    registry: Arc<ErrorRegistry>,
    renderer: Arc<ErrorRenderer>,
    log_filter: LogFilterResolver,
    logger: Arc<dyn Logger>,
    timeout: Duration,
    default_error: ErrorSelector,
    debug_timing: bool,
}

impl Dispatcher {
    /// Creates a dispatcher over `routes`.
    ///
    /// Error types from the config are registered on top of the built-ins,
    /// shadowing them on name collisions.
    #[must_use]
    pub fn new(routes: RouteTable<Handler>, config: &ServerConfig) -> Self {
        let mut registry = ErrorRegistry::new();
        for error_type in &config.error_types {
            // Overwrite is implied for config-borne types.
            let _ = registry.add_type(error_type.clone(), true);
        }
        let registry = Arc::new(registry);
        let renderer = Arc::new(ErrorRenderer::new(
            registry.clone(),
            config.error_body,
            config.production,
        ));
        Self {
            routes,
            registry,
            renderer,
            log_filter: LogFilterResolver::new(config.error_log_types.clone()),
            logger: Arc::new(TracingLogger),
            timeout: config.timeout(),
            default_error: config.default_error.clone(),
            debug_timing: config.debug_timing,
        }
    }

    /// Replaces the logger the loop reports through.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Read access to the route table.
    #[must_use]
    pub fn routes(&self) -> &RouteTable<Handler> {
        &self.routes
    }

    /// Runs one request through the loop and closes it.
    ///
    /// The sink is guaranteed to be completed exactly once by the time this
    /// returns, whatever the handler did.
    pub async fn dispatch(&self, raw: RawRequest, sink: Box<dyn ResponseSink>) -> DispatchOutcome {
        let started = Instant::now();
        let method = raw.method.clone();
        let path = raw.path.clone();
        let event = Arc::new(RequestEvent::new(raw, sink, self.renderer.clone()));

        let outcome = self.run(&event).await;

        if let Err(error) = event.consume() {
            self.logger
                .error(&format!("[HTTP] failed to close request: {error}"));
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(
            method = %method,
            path = %path,
            status = event.status(),
            outcome = outcome.as_str(),
            elapsed_ms,
            "request dispatched"
        );
        if self.debug_timing {
            let status = event
                .status()
                .map_or_else(|| "-".to_string(), |status| status.to_string());
            self.logger
                .verbose(&format!("[HTTP] {method} {status} {path} [{elapsed_ms}ms]"));
        }
        outcome
    }

    async fn run(&self, event: &Arc<RequestEvent>) -> DispatchOutcome {
        let Some(found) = self.routes.find(event.path()) else {
            let error = HttpError::new(self.registry.resolve(Some(&self.default_error)));
            self.fail_event(event, &error);
            return DispatchOutcome::NotFound;
        };

        let Some(handler) = found.methods.resolve(event.method()).cloned() else {
            let error = HttpError::new(self.method_not_allowed());
            self.fail_event(event, &error);
            return DispatchOutcome::MethodNotAllowed;
        };
        event.set_params(found.params);

        let mut task = tokio::spawn((*handler)(event.clone()));
        tokio::select! {
            result = &mut task => match result {
                Ok(Ok(())) => DispatchOutcome::Handled,
                Ok(Err(error)) => {
                    self.handle_error(event, error);
                    DispatchOutcome::Errored
                }
                Err(join_error) => {
                    self.handle_error(
                        event,
                        HandlerError::Other(anyhow::anyhow!("handler panicked: {join_error}")),
                    );
                    DispatchOutcome::Errored
                }
            },
            () = tokio::time::sleep(self.timeout) => {
                // Cancellation is cooperative: the handler task keeps
                // running, but its eventual terminal write is rejected by the
                // event's state machine.
                self.logger.error("[HTTP] request timed out");
                let error = HttpError::new(self.timeout_type());
                if event.can_respond() {
                    if let Err(delivery) = event.fail(&error) {
                        self.logger.debug(&format!(
                            "[HTTP] timeout response not delivered: {delivery}"
                        ));
                    }
                }
                DispatchOutcome::TimedOut
            }
        }
    }

    /// Logs a boundary error at the filter-chosen severity and answers the
    /// event with it.
    fn fail_event(&self, event: &RequestEvent, error: &HttpError) {
        let level = self.log_filter.resolve(error.code(), error.name());
        self.logger.at(
            level,
            &format!(
                "[HTTP] {} {} responded with an error: {error}",
                event.method(),
                event.path()
            ),
        );
        self.respond_with(event, error);
    }

    fn handle_error(&self, event: &RequestEvent, error: HandlerError) {
        match error {
            HandlerError::Http(error) => self.fail_event(event, &error),
            HandlerError::Event(EventError::AlreadyResponded) => {
                // A programming error in the handler, never fatal to the loop.
                self.logger.error(&format!(
                    "[HTTP] {} {} handler attempted a second response",
                    event.method(),
                    event.path()
                ));
            }
            HandlerError::Event(error) => {
                self.logger.error(&format!(
                    "[HTTP] {} {} response sink failed: {error}",
                    event.method(),
                    event.path()
                ));
            }
            HandlerError::Other(error) => {
                let http = self.renderer.internal(&error);
                let level = self.log_filter.resolve(http.code(), http.name());
                self.logger.at(
                    level,
                    &format!(
                        "[HTTP] {} {} raised an untyped error: {error:#}",
                        event.method(),
                        event.path()
                    ),
                );
                self.respond_with(event, &http);
            }
        }
    }

    /// Best-effort error delivery; failures here are logged, never raised.
    fn respond_with(&self, event: &RequestEvent, error: &HttpError) {
        if event.can_respond() {
            if let Err(delivery) = event.fail(error) {
                self.logger
                    .error(&format!("[HTTP] failed to deliver error response: {delivery}"));
            }
        } else {
            self.logger
                .error("[HTTP] cannot deliver error response, response already started");
        }
    }

    /// The 405 type exists implicitly even when not registered.
    fn method_not_allowed(&self) -> ErrorType {
        self.registry
            .get("method_not_allowed")
            .cloned()
            .unwrap_or_else(|| ErrorType::new(405, "method_not_allowed"))
    }

    fn timeout_type(&self) -> ErrorType {
        self.registry
            .get("timeout")
            .cloned()
            .unwrap_or_else(|| ErrorType::new(408, "timeout"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use http::Method;
    use parking_lot::Mutex;
    use switchyard_core::{ErrorBodyMode, LogFilterRule, LogLevel};
    use tokio::sync::oneshot;

    use super::*;
    use crate::handler::handler;
    use crate::network::sink::{BufferedSink, SinkReply};

    #[derive(Default)]
    struct RecordingLogger {
        lines: Mutex<Vec<(LogLevel, String)>>,
    }

    impl RecordingLogger {
        fn contains(&self, level: LogLevel, fragment: &str) -> bool {
            self.lines
                .lock()
                .iter()
                .any(|(l, message)| *l == level && message.contains(fragment))
        }
    }

    impl Logger for RecordingLogger {
        fn verbose(&self, message: &str) {
            self.lines.lock().push((LogLevel::Verbose, message.to_string()));
        }

        fn debug(&self, message: &str) {
            self.lines.lock().push((LogLevel::Debug, message.to_string()));
        }

        fn info(&self, message: &str) {
            self.lines.lock().push((LogLevel::Info, message.to_string()));
        }

        fn warn(&self, message: &str) {
            self.lines.lock().push((LogLevel::Warn, message.to_string()));
        }

        fn error(&self, message: &str) {
            self.lines.lock().push((LogLevel::Error, message.to_string()));
        }
    }

    fn dispatcher_with(
        routes: RouteTable<Handler>,
        config: &ServerConfig,
    ) -> (Dispatcher, Arc<RecordingLogger>) {
        let logger = Arc::new(RecordingLogger::default());
        let dispatcher = Dispatcher::new(routes, config).with_logger(logger.clone());
        (dispatcher, logger)
    }

    fn raw(method: Method, path: &str) -> RawRequest {
        RawRequest {
            method,
            path: path.to_string(),
            headers: http::HeaderMap::new(),
            query: std::collections::HashMap::new(),
            payload: bytes::Bytes::new(),
        }
    }

    fn send_ok(status: u16) -> Handler {
        handler(move |event: Arc<RequestEvent>| async move {
            event.send(status, Some(b"ok"))?;
            Ok(())
        })
    }

    async fn dispatch(
        dispatcher: &Dispatcher,
        method: Method,
        path: &str,
    ) -> (DispatchOutcome, oneshot::Receiver<SinkReply>) {
        let (sink, reply) = BufferedSink::channel();
        let outcome = dispatcher.dispatch(raw(method, path), Box::new(sink)).await;
        (outcome, reply)
    }

    // ---- Routing outcomes ----

    #[tokio::test]
    async fn handled_route_sends_response() {
        let mut routes = RouteTable::new();
        routes.register("/items", Method::GET, send_ok(200));
        let (dispatcher, _) = dispatcher_with(routes, &ServerConfig::default());

        let (outcome, mut reply) = dispatch(&dispatcher, Method::GET, "/items").await;
        assert_eq!(outcome, DispatchOutcome::Handled);

        let sent = reply.try_recv().expect("response sent");
        assert_eq!(sent.status, 200);
        assert_eq!(sent.body.as_ref(), b"ok");
    }

    #[tokio::test]
    async fn params_reach_the_handler() {
        let mut routes = RouteTable::new();
        routes.register(
            "/items/:id",
            Method::GET,
            handler(|event: Arc<RequestEvent>| async move {
                let id = event.param("id").unwrap_or_default();
                event.send(200, Some(id.as_bytes()))?;
                Ok(())
            }),
        );
        let (dispatcher, _) = dispatcher_with(routes, &ServerConfig::default());

        let (_, mut reply) = dispatch(&dispatcher, Method::GET, "/items/42").await;
        assert_eq!(reply.try_recv().expect("response sent").body.as_ref(), b"42");
    }

    #[tokio::test]
    async fn route_miss_renders_default_error() {
        let (dispatcher, logger) = dispatcher_with(RouteTable::new(), &ServerConfig::default());

        let (outcome, mut reply) = dispatch(&dispatcher, Method::GET, "/missing").await;
        assert_eq!(outcome, DispatchOutcome::NotFound);

        let sent = reply.try_recv().expect("error response");
        assert_eq!(sent.status, 404);
        assert_eq!(sent.body.as_ref(), b"not_found");
        assert!(logger.contains(LogLevel::Error, "not_found"));
    }

    #[tokio::test]
    async fn route_miss_uses_configured_selector() {
        let config = ServerConfig {
            default_error: ErrorSelector::Code(500),
            ..ServerConfig::default()
        };
        let (dispatcher, _) = dispatcher_with(RouteTable::new(), &config);

        let (_, mut reply) = dispatch(&dispatcher, Method::GET, "/missing").await;
        let sent = reply.try_recv().expect("error response");
        assert_eq!(sent.status, 500);
        // First registered 500 type is "default".
        assert_eq!(sent.body.as_ref(), b"default");
    }

    #[tokio::test]
    async fn route_miss_respects_log_rules() {
        let config = ServerConfig {
            error_log_types: vec![LogFilterRule::for_code(404, LogLevel::Warn)],
            ..ServerConfig::default()
        };
        let (dispatcher, logger) = dispatcher_with(RouteTable::new(), &config);

        dispatch(&dispatcher, Method::GET, "/missing").await;
        assert!(logger.contains(LogLevel::Warn, "not_found"));
        assert!(!logger.contains(LogLevel::Error, "not_found"));
    }

    #[tokio::test]
    async fn method_miss_renders_405() {
        let mut routes = RouteTable::new();
        routes.register("/items", Method::GET, send_ok(200));
        let (dispatcher, _) = dispatcher_with(routes, &ServerConfig::default());

        let (outcome, mut reply) = dispatch(&dispatcher, Method::DELETE, "/items").await;
        assert_eq!(outcome, DispatchOutcome::MethodNotAllowed);

        let sent = reply.try_recv().expect("error response");
        assert_eq!(sent.status, 405);
        assert_eq!(sent.body.as_ref(), b"method_not_allowed");
    }

    #[tokio::test]
    async fn registered_method_not_allowed_type_is_used() {
        let mut routes = RouteTable::new();
        routes.register("/items", Method::GET, send_ok(200));
        let config = ServerConfig {
            error_types: vec![ErrorType::new(405, "method_not_allowed").with_message("use GET")],
            error_body: ErrorBodyMode::Message,
            ..ServerConfig::default()
        };
        let (dispatcher, _) = dispatcher_with(routes, &config);

        let (_, mut reply) = dispatch(&dispatcher, Method::POST, "/items").await;
        assert_eq!(reply.try_recv().expect("error response").body.as_ref(), b"use GET");
    }

    // ---- Handler errors ----

    #[tokio::test]
    async fn typed_error_rendered_and_logged_at_rule_level() {
        let mut routes = RouteTable::new();
        routes.register(
            "/conflict",
            Method::PUT,
            handler(|_event: Arc<RequestEvent>| async move {
                Err(HttpError::new(
                    ErrorType::new(409, "already_exists").with_message("key taken"),
                )
                .into())
            }),
        );
        let config = ServerConfig {
            error_log_types: vec![LogFilterRule::for_code(409, LogLevel::Warn)],
            ..ServerConfig::default()
        };
        let (dispatcher, logger) = dispatcher_with(routes, &config);

        let (outcome, mut reply) = dispatch(&dispatcher, Method::PUT, "/conflict").await;
        assert_eq!(outcome, DispatchOutcome::Errored);

        let sent = reply.try_recv().expect("error response");
        assert_eq!(sent.status, 409);
        assert_eq!(sent.body.as_ref(), b"already_exists");
        assert!(logger.contains(LogLevel::Warn, "already_exists"));
    }

    #[tokio::test]
    async fn untyped_error_becomes_internal_500() {
        let mut routes = RouteTable::new();
        routes.register(
            "/boom",
            Method::GET,
            handler(|_event: Arc<RequestEvent>| async move {
                Err(anyhow::anyhow!("backend unreachable").into())
            }),
        );
        let config = ServerConfig {
            error_body: ErrorBodyMode::Message,
            ..ServerConfig::default()
        };
        let (dispatcher, logger) = dispatcher_with(routes, &config);

        let (outcome, mut reply) = dispatch(&dispatcher, Method::GET, "/boom").await;
        assert_eq!(outcome, DispatchOutcome::Errored);

        let sent = reply.try_recv().expect("error response");
        assert_eq!(sent.status, 500);
        assert_eq!(sent.body.as_ref(), b"backend unreachable");
        assert!(logger.contains(LogLevel::Error, "backend unreachable"));
    }

    #[tokio::test]
    async fn untyped_error_details_suppressed_in_production() {
        let mut routes = RouteTable::new();
        routes.register(
            "/boom",
            Method::GET,
            handler(|_event: Arc<RequestEvent>| async move {
                Err(anyhow::anyhow!("backend unreachable").into())
            }),
        );
        let config = ServerConfig {
            error_body: ErrorBodyMode::Message,
            production: true,
            ..ServerConfig::default()
        };
        let (dispatcher, logger) = dispatcher_with(routes, &config);

        let (_, mut reply) = dispatch(&dispatcher, Method::GET, "/boom").await;
        let sent = reply.try_recv().expect("error response");
        assert_eq!(sent.body.as_ref(), b"An internal error has occurred");
        // The log still names the cause even when the body does not.
        assert!(logger.contains(LogLevel::Error, "backend unreachable"));
    }

    #[tokio::test]
    async fn handler_panic_becomes_internal_error() {
        async fn panicking(_event: Arc<RequestEvent>) -> Result<(), HandlerError> {
            panic!("kaboom")
        }

        let mut routes = RouteTable::new();
        routes.register("/panic", Method::GET, handler(panicking));
        let (dispatcher, logger) = dispatcher_with(routes, &ServerConfig::default());

        let (outcome, mut reply) = dispatch(&dispatcher, Method::GET, "/panic").await;
        assert_eq!(outcome, DispatchOutcome::Errored);
        assert_eq!(reply.try_recv().expect("error response").status, 500);
        assert!(logger.contains(LogLevel::Error, "handler panicked"));
    }

    #[tokio::test]
    async fn second_response_attempt_logged_loudly() {
        let mut routes = RouteTable::new();
        routes.register(
            "/twice",
            Method::GET,
            handler(|event: Arc<RequestEvent>| async move {
                event.send(200, Some(b"one"))?;
                event.send(200, Some(b"two"))?;
                Ok(())
            }),
        );
        let (dispatcher, logger) = dispatcher_with(routes, &ServerConfig::default());

        let (outcome, mut reply) = dispatch(&dispatcher, Method::GET, "/twice").await;
        assert_eq!(outcome, DispatchOutcome::Errored);

        // The first response went out; the second attempt only logged.
        let sent = reply.try_recv().expect("response sent");
        assert_eq!(sent.body.as_ref(), b"one");
        assert!(logger.contains(LogLevel::Error, "second response"));
    }

    #[tokio::test]
    async fn typed_error_after_response_cannot_deliver() {
        let mut routes = RouteTable::new();
        routes.register(
            "/late-error",
            Method::GET,
            handler(|event: Arc<RequestEvent>| async move {
                event.send(200, Some(b"ok"))?;
                Err(HttpError::new(ErrorType::new(409, "already_exists")).into())
            }),
        );
        let (dispatcher, logger) = dispatcher_with(routes, &ServerConfig::default());

        let (outcome, mut reply) = dispatch(&dispatcher, Method::GET, "/late-error").await;
        assert_eq!(outcome, DispatchOutcome::Errored);
        assert_eq!(reply.try_recv().expect("response sent").status, 200);
        assert!(logger.contains(LogLevel::Error, "response already started"));
    }

    // ---- Timeout ----

    #[tokio::test(start_paused = true)]
    async fn timeout_sends_408() {
        let mut routes = RouteTable::new();
        routes.register(
            "/slow",
            Method::GET,
            handler(|event: Arc<RequestEvent>| async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                event.send(200, Some(b"late"))?;
                Ok(())
            }),
        );
        let config = ServerConfig {
            timeout_ms: 100,
            ..ServerConfig::default()
        };
        let (dispatcher, logger) = dispatcher_with(routes, &config);

        let (outcome, mut reply) = dispatch(&dispatcher, Method::GET, "/slow").await;
        assert_eq!(outcome, DispatchOutcome::TimedOut);

        let sent = reply.try_recv().expect("timeout response");
        assert_eq!(sent.status, 408);
        assert_eq!(sent.body.as_ref(), b"timeout");
        assert!(logger.contains(LogLevel::Error, "request timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn late_completion_is_discarded() {
        let late_result: Arc<Mutex<Option<Result<(), EventError>>>> =
            Arc::new(Mutex::new(None));
        let seen = late_result.clone();

        let mut routes = RouteTable::new();
        routes.register(
            "/slow",
            Method::GET,
            handler(move |event: Arc<RequestEvent>| {
                let seen = seen.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    *seen.lock() = Some(event.send(200, Some(b"late")));
                    Ok(())
                }
            }),
        );
        let config = ServerConfig {
            timeout_ms: 100,
            ..ServerConfig::default()
        };
        let (dispatcher, _) = dispatcher_with(routes, &config);

        let (outcome, mut reply) = dispatch(&dispatcher, Method::GET, "/slow").await;
        assert_eq!(outcome, DispatchOutcome::TimedOut);
        assert_eq!(reply.try_recv().expect("timeout response").status, 408);

        // Let the detached handler task finish on the paused clock; its write
        // must have bounced off the consumed event.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let late = late_result.lock().take().expect("handler completed");
        assert!(matches!(late, Err(EventError::AlreadyResponded)));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_handler_beats_timeout() {
        let mut routes = RouteTable::new();
        routes.register("/fast", Method::GET, send_ok(200));
        let config = ServerConfig {
            timeout_ms: 100,
            ..ServerConfig::default()
        };
        let (dispatcher, logger) = dispatcher_with(routes, &config);

        let (outcome, _) = dispatch(&dispatcher, Method::GET, "/fast").await;
        assert_eq!(outcome, DispatchOutcome::Handled);
        assert!(!logger.contains(LogLevel::Error, "request timed out"));
    }

    // ---- Close semantics ----

    #[tokio::test]
    async fn unanswered_handler_forces_404() {
        let mut routes = RouteTable::new();
        routes.register(
            "/noop",
            Method::GET,
            handler(|_event: Arc<RequestEvent>| async move { Ok(()) }),
        );
        let (dispatcher, _) = dispatcher_with(routes, &ServerConfig::default());

        let (outcome, mut reply) = dispatch(&dispatcher, Method::GET, "/noop").await;
        assert_eq!(outcome, DispatchOutcome::Handled);

        let sent = reply.try_recv().expect("forced close");
        assert_eq!(sent.status, 404);
        assert!(sent.body.is_empty());
    }

    #[tokio::test]
    async fn debug_timing_emits_latency_line() {
        let mut routes = RouteTable::new();
        routes.register("/items", Method::GET, send_ok(200));
        let config = ServerConfig {
            debug_timing: true,
            ..ServerConfig::default()
        };
        let (dispatcher, logger) = dispatcher_with(routes, &config);

        dispatch(&dispatcher, Method::GET, "/items").await;
        assert!(logger.contains(LogLevel::Verbose, "[HTTP] GET 200 /items ["));
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(DispatchOutcome::Handled.as_str(), "handled");
        assert_eq!(DispatchOutcome::TimedOut.as_str(), "timed_out");
    }
}
