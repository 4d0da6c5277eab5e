//! Request lifecycle wrapper guaranteeing at most one terminal response.
//!
//! A [`RequestEvent`] pairs one inbound request with its [`ResponseSink`] and
//! tracks a strictly monotonic state machine: pending until the first of
//! [`send`](RequestEvent::send), [`fail`](RequestEvent::fail) or
//! [`consume`](RequestEvent::consume) runs, consumed forever after. Every
//! terminal write checks the state under one lock, so concurrent completion
//! paths (a handler racing a timeout) cannot write to the wire twice: the
//! loser gets [`EventError::AlreadyResponded`].

use std::collections::HashMap;

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use switchyard_core::HttpError;
use thiserror::Error;

use crate::render::ErrorRenderer;

/// Transport-provided response writer.
///
/// `headers_sent` must report whether the status line has gone out, including
/// writes that bypassed the event, so the lifecycle guard can refuse to write
/// into a half-sent response.
pub trait ResponseSink: Send {
    /// Writes the status line.
    ///
    /// # Errors
    ///
    /// Fails when the transport rejects the write.
    fn write_head(&mut self, status: u16) -> anyhow::Result<()>;

    /// Writes a body chunk.
    ///
    /// # Errors
    ///
    /// Fails when the transport rejects the write.
    fn write(&mut self, chunk: &[u8]) -> anyhow::Result<()>;

    /// Completes the response.
    ///
    /// # Errors
    ///
    /// Fails when the transport rejects the completion.
    fn end(&mut self) -> anyhow::Result<()>;

    /// Whether the status line has already been written.
    fn headers_sent(&self) -> bool;
}

/// A normalized inbound request, as handed over by the transport.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    /// Decoded query string; duplicate keys keep the last value.
    pub query: HashMap<String, String>,
    /// Opaque request body. Parsing is the handler's business.
    pub payload: Bytes,
}

impl RawRequest {
    /// Builds a raw request from decomposed `http` request parts.
    #[must_use]
    pub fn from_parts(parts: &Parts, payload: Bytes) -> Self {
        let query = parts
            .uri
            .query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            headers: parts.headers.clone(),
            query,
            payload,
        }
    }
}

/// Failure to terminate a request.
#[derive(Debug, Error)]
pub enum EventError {
    /// A second attempt to terminate an already-answered request.
    #[error("response already sent for this request")]
    AlreadyResponded,
    /// The transport sink failed while writing.
    #[error("response sink failure: {0}")]
    Sink(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventState {
    Pending,
    Consumed,
}

struct EventInner {
    state: EventState,
    status: Option<u16>,
    sink: Box<dyn ResponseSink>,
}

/// One in-flight request/response pair.
///
/// Owned by a single dispatch cycle and shared with its handler behind an
/// [`Arc`]; all mutation goes through the internal lock.
pub struct RequestEvent {
    raw: RawRequest,
    params: RwLock<HashMap<String, String>>,
    renderer: Arc<ErrorRenderer>,
    inner: Mutex<EventInner>,
}

impl RequestEvent {
    /// Wraps a raw request and its sink.
    #[must_use]
    pub fn new(raw: RawRequest, sink: Box<dyn ResponseSink>, renderer: Arc<ErrorRenderer>) -> Self {
        Self {
            raw,
            params: RwLock::new(HashMap::new()),
            renderer,
            inner: Mutex::new(EventInner {
                state: EventState::Pending,
                status: None,
                sink,
            }),
        }
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.raw.method
    }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.raw.path
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.raw.headers
    }

    /// Decoded query parameters.
    #[must_use]
    pub fn query(&self) -> &HashMap<String, String> {
        &self.raw.query
    }

    /// Opaque request body.
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.raw.payload
    }

    /// A captured route parameter by name; wildcard captures live under `*`.
    /// Values arrive percent-decoded from the route table.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<String> {
        self.params.read().get(name).cloned()
    }

    /// All captured route parameters, percent-decoded.
    #[must_use]
    pub fn params(&self) -> HashMap<String, String> {
        self.params.read().clone()
    }

    pub(crate) fn set_params(&self, params: HashMap<String, String>) {
        *self.params.write() = params;
    }

    /// Writes a response and consumes the event.
    ///
    /// The event counts as consumed even when the sink fails mid-write: a
    /// partial response leaves the wire in an unknown state, so no retry is
    /// possible.
    ///
    /// # Errors
    ///
    /// [`EventError::AlreadyResponded`] when the event was consumed before or
    /// the sink already started writing; [`EventError::Sink`] when the
    /// transport rejects a write.
    pub fn send(&self, status: u16, body: Option<&[u8]>) -> Result<(), EventError> {
        let mut inner = self.inner.lock();
        if inner.state == EventState::Consumed || inner.sink.headers_sent() {
            return Err(EventError::AlreadyResponded);
        }
        inner.state = EventState::Consumed;
        inner.status = Some(status);
        inner.sink.write_head(status)?;
        if let Some(body) = body {
            inner.sink.write(body)?;
        }
        inner.sink.end()?;
        Ok(())
    }

    /// Renders `error` through the configured body mode and sends it.
    ///
    /// # Errors
    ///
    /// Same contract as [`send`](RequestEvent::send).
    pub fn fail(&self, error: &HttpError) -> Result<(), EventError> {
        let (status, body) = self.renderer.render(error);
        self.send(status, Some(body.as_bytes()))
    }

    /// Closes the event without writing further payload.
    ///
    /// Idempotent: a consumed event returns `Ok` immediately. If nothing was
    /// sent yet the status defaults to 404 before the sink is closed, since a
    /// matched route that never answered has nothing to say.
    ///
    /// # Errors
    ///
    /// [`EventError::Sink`] when closing the sink fails.
    pub fn consume(&self) -> Result<(), EventError> {
        let mut inner = self.inner.lock();
        if inner.state == EventState::Consumed {
            return Ok(());
        }
        inner.state = EventState::Consumed;
        if !inner.sink.headers_sent() {
            let status = inner.status.unwrap_or(404);
            inner.status = Some(status);
            inner.sink.write_head(status)?;
        }
        inner.sink.end()?;
        Ok(())
    }

    /// Whether a terminal response can still be written.
    #[must_use]
    pub fn can_respond(&self) -> bool {
        let inner = self.inner.lock();
        inner.state == EventState::Pending && !inner.sink.headers_sent()
    }

    /// Whether the event reached its terminal state.
    #[must_use]
    pub fn was_consumed(&self) -> bool {
        self.inner.lock().state == EventState::Consumed
    }

    /// The response status recorded so far.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.inner.lock().status
    }
}
