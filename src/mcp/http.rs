//! Stateless HTTP bridge onto the dispatcher.
//!
//! There is no handshake here: each `POST /mcp/execute` is decoded and
//! dispatched on its own, against the same session the process created at
//! startup.

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::codec::decode_value;
use super::dispatcher::Dispatcher;
use super::server::{PROTOCOL_VERSION, SERVER_NAME};
use crate::errors::{CodeIndexError, Result};

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "code-index-mcp";

/// Builds the bridge router.
pub fn make_app(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/mcp/execute", post(execute))
        .with_state(dispatcher)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Binds `host:port` and serves the bridge until the future is dropped.
pub async fn serve(dispatcher: Dispatcher, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|_| CodeIndexError::Config {
            message: format!("invalid listen address {}:{}", host, port),
        })?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP bridge listening on http://{}", addr);
    axum::serve(listener, make_app(dispatcher)).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": SERVER_NAME,
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "protocolVersion": PROTOCOL_VERSION,
        "endpoints": {
            "health": "/health",
            "execute": "/mcp/execute"
        }
    }))
}

fn error_body(err: &CodeIndexError) -> Json<Value> {
    Json(json!({
        "status": "error",
        "code": err.code(),
        "message": err.to_string(),
    }))
}

async fn execute(State(dispatcher): State<Dispatcher>, body: Bytes) -> Json<Value> {
    let decoded = serde_json::from_slice::<Value>(&body)
        .map_err(|e| CodeIndexError::MalformedMessage {
            message: e.to_string(),
        })
        .and_then(decode_value);
    let request = match decoded {
        Ok(request) => request,
        Err(err) => return error_body(&err),
    };

    // Handlers touch the filesystem; keep them off the async workers.
    let outcome = tokio::task::spawn_blocking(move || dispatcher.dispatch(&request)).await;
    match outcome.map(serde_json::to_value) {
        Ok(Ok(response)) => Json(response),
        Ok(Err(e)) => {
            error!("failed to encode dispatch result: {}", e);
            Json(json!({ "status": "error", "message": "internal error" }))
        }
        Err(e) => {
            error!("dispatch task failed: {}", e);
            Json(json!({ "status": "error", "message": "internal error" }))
        }
    }
}
