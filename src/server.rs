// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// HTTP and WebSocket surface
//
// Responsibilities:
// - Heartbeat, health and stats endpoints for operators
// - Per-component breaker inspection and manual reset
// - Table upload, metadata and removal
// - One WebSocket per client; each text message runs the pipeline and
//   every event goes out as one JSON text frame

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::breaker::{components, BreakerError};
use crate::frame::{TableError, TableFormat};
use crate::pipeline::Pipeline;
use crate::stream::{ChannelSink, StreamEvent};

/// Events queued per connection before the pipeline waits on the socket.
const WS_BUFFER: usize = 256;

/// Uploads larger than this are rejected.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("no table loaded")]
    NoTable,

    #[error("invalid table: {0}")]
    InvalidTable(#[from] TableError),

    #[error("circuit breaker open for {0}")]
    Unavailable(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::UnknownComponent(_) | ServerError::NoTable => StatusCode::NOT_FOUND,
            ServerError::InvalidTable(TableError::UnsupportedFormat(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ServerError::InvalidTable(_) => StatusCode::BAD_REQUEST,
            ServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

// ---------------------------------------------------------------------------
// Operator endpoints
// ---------------------------------------------------------------------------

pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let s = state.pipeline.services();
    let timeout = Duration::from_millis(s.config.runtime.generation.health_timeout_ms);
    let generation = match s
        .breakers
        .execute_with_timeout(components::GENERATION, timeout, || s.generation.health())
        .await
    {
        Ok(()) => json!({ "available": true }),
        Err(e) => json!({ "available": false, "error": e.to_string() }),
    };
    let system = s.breakers.get_system_health();
    Json(json!({
        "status": system.overall_health,
        "generation": generation,
        "table_loaded": s.tables.current().is_some(),
        "policy_hash": s.config.policy_hash,
        "system": system,
    }))
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    let s = state.pipeline.services();
    Json(json!({
        "buffer": s.buffers.stats(),
        "streaming": s.streaming.stats(),
        "serializer": s.serializer.stats(),
        "validator": s.validator.stats(),
        "errors": s.breakers.error_summary(24),
    }))
}

async fn reset_stats(State(state): State<AppState>) -> StatusCode {
    let s = state.pipeline.services();
    s.buffers.reset_stats();
    s.streaming.reset_stats();
    s.serializer.reset_stats();
    s.validator.reset_stats();
    tracing::info!("stats reset");
    StatusCode::NO_CONTENT
}

async fn breaker_health(
    State(state): State<AppState>,
    Path(component): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let health = state
        .pipeline
        .services()
        .breakers
        .get_health(&component)
        .ok_or(ServerError::UnknownComponent(component))?;
    Ok(Json(json!(health)))
}

async fn reset_breaker(
    State(state): State<AppState>,
    Path(component): Path<String>,
) -> Result<Json<Value>, ServerError> {
    if !state.pipeline.services().breakers.reset(&component) {
        return Err(ServerError::UnknownComponent(component));
    }
    Ok(Json(json!({ "component": component, "reset": true })))
}

// ---------------------------------------------------------------------------
// Table endpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub filename: Option<String>,
}

async fn upload_table(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServerError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let filename = params.filename.unwrap_or_else(|| "upload".to_string());
    let format = TableFormat::detect(&filename).or_else(|_| TableFormat::detect(content_type))?;

    let s = state.pipeline.services();
    let loaded = s
        .breakers
        .execute(components::TABLE_STORE, || async {
            s.tables.load(&filename, &body, format)
        })
        .await
        .map_err(|e| match e {
            BreakerError::Failed(e) => ServerError::InvalidTable(e),
            _ => ServerError::Unavailable(components::TABLE_STORE.to_string()),
        })?;

    Ok(Json(json!({
        "filename": filename,
        "loaded_at": loaded.loaded_at,
        "metadata": &*loaded.metadata,
    })))
}

async fn table_metadata(State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    let loaded = state
        .pipeline
        .services()
        .tables
        .current()
        .ok_or(ServerError::NoTable)?;
    Ok(Json(json!(&*loaded.metadata)))
}

async fn clear_table(State(state): State<AppState>) -> Json<Value> {
    let cleared = state.pipeline.services().tables.clear();
    if cleared {
        tracing::info!("table cleared");
    }
    Json(json!({ "cleared": cleared }))
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// An inbound chat message: `{"message": "...", "rules": [...]}` or the
/// bare text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientMessage {
    pub message: String,
    #[serde(default)]
    pub rules: Vec<String>,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| ClientMessage {
            message: text.to_string(),
            rules: Vec::new(),
        })
    }
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(connection_id = %connection_id, "client connected");

    let (mut outbound, mut inbound) = socket.split();
    let (tx, mut rx) = mpsc::channel::<StreamEvent>(WS_BUFFER);

    let forwarder = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, event = event.name(), "event not serializable");
                    continue;
                }
            };
            if outbound.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let sink = ChannelSink::new(tx);
    while let Some(frame) = inbound.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let incoming = ClientMessage::parse(&text);
        if incoming.message.trim().is_empty() {
            continue;
        }
        if let Err(e) = state
            .pipeline
            .handle_message(&sink, &incoming.message, &incoming.rules)
            .await
        {
            tracing::info!(connection_id = %connection_id, error = %e, "client went away mid-response");
            break;
        }
    }

    drop(sink);
    let _ = forwarder.await;
    tracing::info!(connection_id = %connection_id, "client disconnected");
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the router around an already-wired pipeline.
pub fn build_router(pipeline: Arc<Pipeline>) -> Router {
    let state = AppState { pipeline };

    Router::new()
        .route("/heartbeat", get(heartbeat))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/stats/reset", post(reset_stats))
        .route("/breakers/{component}", get(breaker_health))
        .route("/breakers/{component}/reset", post(reset_breaker))
        .route("/table", post(upload_table).delete(clear_table))
        .route("/table/metadata", get(table_metadata))
        .route("/ws", get(ws_handler))
        .layer(axum::extract::DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_accepts_json_or_text() {
        assert_eq!(
            ClientMessage::parse(r#"{"message": "count rows", "rules": ["be brief"]}"#),
            ClientMessage {
                message: "count rows".into(),
                rules: vec!["be brief".into()],
            }
        );
        assert_eq!(ClientMessage::parse("count rows").message, "count rows");
        // JSON without a message field is taken literally
        assert_eq!(ClientMessage::parse(r#"{"text": 1}"#).message, r#"{"text": 1}"#);
    }

    #[test]
    fn errors_map_to_statuses() {
        let status = |e: ServerError| e.into_response().status();
        assert_eq!(status(ServerError::NoTable), StatusCode::NOT_FOUND);
        assert_eq!(
            status(ServerError::UnknownComponent("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(ServerError::InvalidTable(TableError::UnsupportedFormat("x.xlsx".into()))),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            status(ServerError::Unavailable("table_store".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
