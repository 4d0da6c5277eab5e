//! Switchyard Server — HTTP request dispatch over the core route trie.
//!
//! Routing, error taxonomy, and log filter rules live in `switchyard-core`;
//! this crate adds the request lifecycle ([`RequestEvent`]), the dispatch
//! loop ([`Dispatcher`]), REST resource mounting, and the axum transport
//! ([`HttpModule`]).

pub mod config;
pub mod crud;
pub mod dispatch;
pub mod event;
pub mod handler;
pub mod logging;
pub mod network;
pub mod render;

pub use config::ServerConfig;
pub use crud::{mount_crud, CrudAdapter, CrudResponse};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use event::{RawRequest, RequestEvent, ResponseSink};
pub use handler::{handler, Handler, HandlerError};
pub use logging::{Logger, TracingLogger};
pub use network::{BufferedSink, HttpModule, SinkReply};
pub use render::ErrorRenderer;
