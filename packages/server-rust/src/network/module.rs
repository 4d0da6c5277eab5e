//! HTTP transport module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. This separation allows the rest of the application to
//! register routes and shared state between `start()` and `serve()`.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use super::middleware::build_http_layers;
use super::sink::BufferedSink;
use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::event::RawRequest;

/// Manages the HTTP server lifecycle around a [`Dispatcher`].
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- wraps the dispatcher in shared state
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts connections until the shutdown future resolves
pub struct HttpModule {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    listener: Option<TcpListener>,
}

impl HttpModule {
    /// Creates a new transport module without binding any port.
    #[must_use]
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            listener: None,
        }
    }

    /// Returns a shared reference to the dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Assembles the axum router.
    ///
    /// Every request funnels through the dispatch loop via a fallback
    /// handler; no axum-level routes are registered. The middleware stack
    /// from [`build_http_layers`] wraps the whole router.
    #[must_use]
    pub fn build_router(&self) -> Router {
        let state = AppState {
            dispatcher: Arc::clone(&self.dispatcher),
        };

        Router::new()
            .fallback(handle_request)
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("HTTP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Starts serving requests until the shutdown future resolves.
    ///
    /// Consumes `self` because the listener is moved into the server.
    /// Outside production mode the registered route tree is dumped at
    /// debug level before the first request is accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        if !self.config.production {
            debug!("route tree:\n{}", self.dispatcher.routes().pretty_print());
        }

        let listener = self
            .listener
            .expect("start() must be called before serve()");

        info!("serving HTTP requests");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// Shared state handed to the fallback handler.
#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

/// Bridges one axum request into the dispatch loop.
///
/// The request body is collected up front (the body-limit layer bounds its
/// size), handed to the dispatcher through a [`BufferedSink`], and the
/// buffered reply becomes the axum response.
async fn handle_request(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let payload = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "failed to read request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let raw = RawRequest::from_parts(&parts, payload);
    let (sink, reply) = BufferedSink::channel();
    state.dispatcher.dispatch(raw, Box::new(sink)).await;

    match reply.await {
        Ok(reply) => {
            let status = StatusCode::from_u16(reply.status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, reply.body).into_response()
        }
        Err(_) => {
            // The sink was dropped without end(); dispatch guarantees close,
            // so this indicates a bug rather than a request-level failure.
            error!("request completed without producing a response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
