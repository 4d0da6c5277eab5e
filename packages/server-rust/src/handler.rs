//! The handler contract: boxed async functions over a shared [`RequestEvent`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use switchyard_core::HttpError;
use thiserror::Error;

use crate::event::{EventError, RequestEvent};

/// Future returned by a handler invocation.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;

/// An async request handler.
///
/// Handlers receive the event, answer it through
/// [`send`](RequestEvent::send) or [`fail`](RequestEvent::fail), and return
/// `Ok(())`; any returned error is rendered by the dispatch loop.
pub type Handler = Arc<dyn Fn(Arc<RequestEvent>) -> HandlerFuture + Send + Sync>;

/// Everything a handler can fail with.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A typed application error, rendered with its own code and type.
    #[error(transparent)]
    Http(#[from] HttpError),
    /// A lifecycle or sink failure while answering the event.
    #[error(transparent)]
    Event(#[from] EventError),
    /// Anything else; rendered as a 500 `internal_error`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Wraps an async closure as a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Arc<RequestEvent>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;
    use http::{HeaderMap, Method};
    use switchyard_core::{ErrorBodyMode, ErrorRegistry, ErrorType};

    use super::*;
    use crate::event::RawRequest;
    use crate::network::sink::BufferedSink;
    use crate::render::ErrorRenderer;

    fn test_event() -> Arc<RequestEvent> {
        let (sink, _reply) = BufferedSink::channel();
        let renderer = Arc::new(ErrorRenderer::new(
            Arc::new(ErrorRegistry::new()),
            ErrorBodyMode::Type,
            false,
        ));
        let raw = RawRequest {
            method: Method::GET,
            path: "/test".to_string(),
            headers: HeaderMap::new(),
            query: HashMap::new(),
            payload: Bytes::new(),
        };
        Arc::new(RequestEvent::new(raw, Box::new(sink), renderer))
    }

    #[tokio::test]
    async fn wrapped_closure_runs() {
        let h = handler(|event: Arc<RequestEvent>| async move {
            event.send(204, None)?;
            Ok(())
        });

        let event = test_event();
        (*h)(event.clone()).await.expect("handler succeeds");
        assert_eq!(event.status(), Some(204));
    }

    #[test]
    fn display_is_transparent() {
        let err = HandlerError::from(HttpError::new(
            ErrorType::new(409, "already_exists").with_message("taken"),
        ));
        assert_eq!(err.to_string(), "HTTP 409 [already_exists]: taken");

        let err = HandlerError::from(anyhow::anyhow!("backend unreachable"));
        assert_eq!(err.to_string(), "backend unreachable");
    }
}
