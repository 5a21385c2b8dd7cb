//! Resolves decoded requests against the capability registry and invokes the
//! matching handler with the shared session.
//!
//! Every invocation goes through [`Dispatcher::invoke`], which merges template
//! captures into the parameters, holds the session lock for the duration of
//! the handler, contains panics, and sanitizes failures before they become
//! error responses.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::{json, Map, Value};
use tracing::{debug, error, warn};

use super::registry::{CapabilityRegistry, Resolved};
use super::server::initialize_result;
use super::transport::{JsonRpcRequest, JsonRpcResponse};
use crate::errors::{CodeIndexError, Result};
use crate::session::SharedSession;
use crate::types::CapabilityKind;

/// Maximum character length of a text payload before truncation.
const MAX_RESPONSE_CHARS: usize = 100_000;

/// Runtime counters for dispatched traffic.
pub struct DispatchStats {
    started_at: Instant,
    total_requests: AtomicU64,
    errors: AtomicU64,
    calls: Mutex<HashMap<String, u64>>,
}

impl DispatchStats {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn record_call(&self, identifier: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(identifier.to_string()).or_insert(0) += 1;
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn to_json(&self) -> Value {
        let calls = self
            .calls
            .lock()
            .map(|calls| json!(*calls))
            .unwrap_or(json!({}));
        json!({
            "uptime_secs": self.started_at.elapsed().as_secs(),
            "total_requests": self.total_requests(),
            "errors": self.errors(),
            "calls": calls,
        })
    }
}

/// Truncates a string to the response limit on a char boundary, appending a
/// notice when anything was cut.
fn truncate_response(s: &str) -> String {
    if s.len() <= MAX_RESPONSE_CHARS {
        return s.to_string();
    }
    let mut end = MAX_RESPONSE_CHARS;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    format!("{}\n\n[... truncated at {} chars]", &s[..end], end)
}

/// Renders a handler value as text: strings verbatim, anything else as
/// pretty JSON.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => truncate_response(s),
        other => truncate_response(&serde_json::to_string_pretty(other).unwrap_or_default()),
    }
}

/// Reads a required string member from the params object.
fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CodeIndexError::invalid_params(format!("missing required parameter: {}", key)))
}

/// Stateless request router over a fixed registry and the shared session.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    session: SharedSession,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    pub fn new(registry: CapabilityRegistry, session: SharedSession) -> Self {
        Self {
            registry: Arc::new(registry),
            session,
            stats: Arc::new(DispatchStats::new()),
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Dispatches one request and returns the response to send. The caller
    /// decides whether a notification's response is delivered.
    pub fn dispatch(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
        let id = request.response_id();
        debug!(method = %request.method, "dispatching");

        match self.route(request) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                let (code, message) = sanitize(&err, &request.method);
                JsonRpcResponse::error_with_code(id, code, message)
            }
        }
    }

    fn route(&self, request: &JsonRpcRequest) -> Result<Value> {
        let params = request.params_or_empty();
        match request.method.as_str() {
            "ping" => Ok(json!({})),
            // Only reachable over the HTTP bridge; stdio answers it in the
            // protocol state machine.
            "initialize" => Ok(initialize_result()),
            "tools/list" => Ok(json!({ "tools": self.registry.tool_definitions() })),
            "resources/list" => Ok(json!({ "resources": self.registry.resource_definitions(false) })),
            "resources/templates/list" => Ok(json!({
                "resourceTemplates": self.registry.resource_definitions(true)
            })),
            "resources/read" => {
                let uri = required_str(&params, "uri")?;
                let resolved = self.registry.resolve_kind(CapabilityKind::Resource, uri)?;
                let value = self.invoke(resolved, json!({}))?;
                Ok(resource_contents(uri, &value))
            }
            "tools/call" => {
                let name = required_str(&params, "name")?;
                let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
                let resolved = self.registry.resolve_kind(CapabilityKind::Tool, name)?;
                let value = self.invoke(resolved, arguments)?;
                Ok(tool_content(&value))
            }
            method => {
                let resolved = self.registry.resolve(method)?;
                let kind = resolved.capability.kind;
                let value = self.invoke(resolved, params)?;
                Ok(match kind {
                    CapabilityKind::Tool => tool_content(&value),
                    CapabilityKind::Resource => resource_contents(method, &value),
                })
            }
        }
    }

    /// The interceptor every handler runs through.
    fn invoke(&self, resolved: Resolved<'_>, params: Value) -> Result<Value> {
        let capability = resolved.capability;
        let mut merged = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(CodeIndexError::invalid_params(
                    "parameters must be a JSON object",
                ))
            }
        };
        merged.extend(resolved.captures);

        self.stats.record_call(capability.identifier());
        let handler = capability.handler;
        let mut session = self.session.lock();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            handler(&mut session, Value::Object(merged))
        }));

        match outcome {
            Ok(result) => result,
            Err(_) => {
                error!(capability = %capability.identifier(), "handler panicked");
                Err(CodeIndexError::HandlerPanicked {
                    capability: capability.identifier().to_string(),
                })
            }
        }
    }
}

/// Converts a failure into the code and text a client may see. System-level
/// detail is logged and replaced by a generic message.
pub fn sanitize(err: &CodeIndexError, context: &str) -> (i32, String) {
    if err.is_client_safe() {
        warn!(context = %context, "request failed: {}", err);
        (err.code(), err.to_string())
    } else {
        error!(context = %context, "internal failure: {}", err);
        (err.code(), format!("internal error while handling {}", context))
    }
}

fn tool_content(value: &Value) -> Value {
    json!({ "content": [{ "type": "text", "text": as_text(value) }] })
}

fn resource_contents(uri: &str, value: &Value) -> Value {
    let mime = if value.is_string() {
        "text/plain"
    } else {
        "application/json"
    };
    json!({
        "contents": [{ "uri": uri, "mimeType": mime, "text": as_text(value) }]
    })
}
