//! Demo HTTP server wired end to end.
//!
//! Registers a couple of sample routes plus an in-memory note store mounted
//! through the CRUD routes, then serves until Ctrl-C. Intended for manual
//! poking:
//!
//! ```text
//! cargo run --bin demo-server -- --port 8080
//! curl localhost:8080/hello/world
//! curl -X POST localhost:8080/notes -d '{"text":"first"}'
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use http::Method;
use parking_lot::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use switchyard_core::{ErrorType, HttpError, RouteTable};
use switchyard_server::{
    handler, mount_crud, CrudAdapter, CrudResponse, Dispatcher, Handler, HandlerError,
    HttpModule, ServerConfig,
};

#[derive(Debug, Parser)]
#[command(name = "demo-server", about = "Switchyard demo HTTP server")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on (0 for an OS-assigned port).
    #[arg(long, env = "HTTP_PORT", default_value_t = 3000)]
    port: u16,

    /// Handler timeout in milliseconds.
    #[arg(long, default_value_t = 60_000)]
    timeout_ms: u64,

    /// Suppress error details and the startup route dump.
    #[arg(long)]
    production: bool,

    /// Log a latency line for every request.
    #[arg(long)]
    debug_timing: bool,
}

/// In-memory note store served through the CRUD routes.
struct NoteStore {
    inner: Mutex<NoteStoreInner>,
}

struct NoteStoreInner {
    next_id: u64,
    notes: BTreeMap<String, serde_json::Value>,
}

impl NoteStore {
    fn new() -> Self {
        Self {
            inner: Mutex::new(NoteStoreInner {
                next_id: 1,
                notes: BTreeMap::new(),
            }),
        }
    }

    fn parse(payload: &[u8]) -> Result<serde_json::Value, HandlerError> {
        serde_json::from_slice(payload)
            .map_err(|_| HttpError::new(ErrorType::new(400, "malformed_query")).into())
    }

    fn missing() -> HandlerError {
        HttpError::new(ErrorType::new(404, "not_found")).into()
    }
}

#[async_trait]
impl CrudAdapter for NoteStore {
    async fn get_many(
        &self,
        _query: &HashMap<String, String>,
    ) -> Result<CrudResponse, HandlerError> {
        let inner = self.inner.lock();
        Ok(CrudResponse::new(200).with_data(serde_json::json!(inner.notes)))
    }

    async fn get_one(&self, id: &str) -> Result<CrudResponse, HandlerError> {
        match self.inner.lock().notes.get(id) {
            Some(note) => Ok(CrudResponse::new(200).with_data(note.clone())),
            None => Err(Self::missing()),
        }
    }

    async fn create(&self, payload: &[u8]) -> Result<CrudResponse, HandlerError> {
        let note = Self::parse(payload)?;
        let mut inner = self.inner.lock();
        let id = inner.next_id.to_string();
        inner.next_id += 1;
        inner.notes.insert(id.clone(), note);
        Ok(CrudResponse::new(201).with_data(serde_json::json!({ "id": id })))
    }

    async fn update(&self, id: &str, payload: &[u8]) -> Result<CrudResponse, HandlerError> {
        let note = Self::parse(payload)?;
        let mut inner = self.inner.lock();
        if !inner.notes.contains_key(id) {
            return Err(Self::missing());
        }
        inner.notes.insert(id.to_string(), note.clone());
        Ok(CrudResponse::new(200).with_data(note))
    }

    async fn delete(&self, id: &str) -> Result<CrudResponse, HandlerError> {
        match self.inner.lock().notes.remove(id) {
            Some(_) => Ok(CrudResponse::new(204)),
            None => Err(Self::missing()),
        }
    }
}

fn build_routes() -> RouteTable<Handler> {
    let mut routes: RouteTable<Handler> = RouteTable::new();

    routes.register(
        "/hello/:name",
        Method::GET,
        handler(|event| async move {
            let name = event.param("name").unwrap_or_default();
            let body = format!("hello, {name}\n");
            event.send(200, Some(body.as_bytes()))?;
            Ok(())
        }),
    );

    routes.register(
        "/status",
        Method::GET,
        handler(|event| async move {
            event.send(200, Some(br#"{"ok":true}"#))?;
            Ok(())
        }),
    );

    mount_crud(&mut routes, "/notes", Arc::new(NoteStore::new()));
    routes
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,switchyard_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        timeout_ms: args.timeout_ms,
        production: args.production,
        debug_timing: args.debug_timing,
        ..ServerConfig::default()
    };

    let dispatcher = Dispatcher::new(build_routes(), &config);
    let mut module = HttpModule::new(config, dispatcher);
    let port = module.start().await?;
    tracing::info!(port, "demo server ready");

    module
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}
