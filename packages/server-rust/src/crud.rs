//! REST resource mounting over a [`CrudAdapter`].
//!
//! [`mount_crud`] fans one adapter out into the five standard routes. The
//! adapter decides status codes and payloads through [`CrudResponse`];
//! request bodies stay opaque bytes for the adapter to parse.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use serde::{Deserialize, Serialize};
use switchyard_core::RouteTable;

use crate::event::RequestEvent;
use crate::handler::{handler, Handler, HandlerError};

/// Status and optional JSON payload returned by adapter operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrudResponse {
    /// HTTP status to answer with.
    pub code: u16,
    /// JSON payload; the response body stays empty when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CrudResponse {
    /// A response with no payload.
    #[must_use]
    pub fn new(code: u16) -> Self {
        Self { code, data: None }
    }

    /// Attaches a JSON payload, builder-style.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Backing store for one REST resource.
///
/// Used as `Arc<dyn CrudAdapter>`.
#[async_trait]
pub trait CrudAdapter: Send + Sync {
    /// Lists entities matching the query parameters.
    async fn get_many(&self, query: &HashMap<String, String>)
        -> Result<CrudResponse, HandlerError>;

    /// Fetches one entity by id.
    async fn get_one(&self, id: &str) -> Result<CrudResponse, HandlerError>;

    /// Creates an entity from the request payload.
    async fn create(&self, payload: &[u8]) -> Result<CrudResponse, HandlerError>;

    /// Updates the entity behind `id` from the request payload.
    async fn update(&self, id: &str, payload: &[u8]) -> Result<CrudResponse, HandlerError>;

    /// Deletes the entity behind `id`.
    async fn delete(&self, id: &str) -> Result<CrudResponse, HandlerError>;
}

/// Registers the REST routes for `adapter` under `base`:
///
/// - `GET base` -> [`get_many`](CrudAdapter::get_many)
/// - `GET base/:id` -> [`get_one`](CrudAdapter::get_one)
/// - `POST base` -> [`create`](CrudAdapter::create)
/// - `PUT base/:id` -> [`update`](CrudAdapter::update)
/// - `DELETE base/:id` -> [`delete`](CrudAdapter::delete)
pub fn mount_crud(table: &mut RouteTable<Handler>, base: &str, adapter: Arc<dyn CrudAdapter>) {
    let id_path = format!("{base}/:id");

    let list = adapter.clone();
    table.register(
        base,
        Method::GET,
        handler(move |event: Arc<RequestEvent>| {
            let adapter = list.clone();
            async move {
                let response = adapter.get_many(event.query()).await?;
                answer(&event, &response)
            }
        }),
    );

    let one = adapter.clone();
    table.register(
        &id_path,
        Method::GET,
        handler(move |event: Arc<RequestEvent>| {
            let adapter = one.clone();
            async move {
                let id = event.param("id").unwrap_or_default();
                let response = adapter.get_one(&id).await?;
                answer(&event, &response)
            }
        }),
    );

    let create = adapter.clone();
    table.register(
        base,
        Method::POST,
        handler(move |event: Arc<RequestEvent>| {
            let adapter = create.clone();
            async move {
                let response = adapter.create(event.payload()).await?;
                answer(&event, &response)
            }
        }),
    );

    let update = adapter.clone();
    table.register(
        &id_path,
        Method::PUT,
        handler(move |event: Arc<RequestEvent>| {
            let adapter = update.clone();
            async move {
                let id = event.param("id").unwrap_or_default();
                let response = adapter.update(&id, event.payload()).await?;
                answer(&event, &response)
            }
        }),
    );

    let delete = adapter;
    table.register(
        &id_path,
        Method::DELETE,
        handler(move |event: Arc<RequestEvent>| {
            let adapter = delete.clone();
            async move {
                let id = event.param("id").unwrap_or_default();
                let response = adapter.delete(&id).await?;
                answer(&event, &response)
            }
        }),
    );
}

/// Sends the adapter's code and serialized payload through the event.
fn answer(event: &RequestEvent, response: &CrudResponse) -> Result<(), HandlerError> {
    let body = response
        .data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(anyhow::Error::from)?;
    event.send(response.code, body.as_deref().map(str::as_bytes))?;
    Ok(())
}
