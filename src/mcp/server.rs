//! MCP server that reads JSON-RPC 2.0 messages from stdin and writes
//! responses to stdout.
//!
//! The loop is strictly sequential: a line is read, handled to completion,
//! and its output written and flushed before the next line is read. The
//! session moves through `AwaitingInit -> Initialized -> Terminated`; end of
//! input is the only way out, and it tears the session down.

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tracing::{debug, error, info, warn};

use super::codec::{decode_message, MessageReader, MessageWriter};
use super::dispatcher::Dispatcher;
use super::transport::{
    ErrorCode, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, OutgoingMessage,
};
use crate::errors::Result;

/// MCP protocol revision advertised during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name advertised in `serverInfo`.
pub const SERVER_NAME: &str = "CodeIndexer";

/// Where the stdio session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    AwaitingInit,
    Initialized,
    Terminated,
}

/// The result returned for `initialize`.
pub fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {},
            "resources": {}
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// The stdio protocol state machine.
pub struct McpServer {
    dispatcher: Dispatcher,
    state: ProtocolState,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            state: ProtocolState::AwaitingInit,
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Serves stdin/stdout until stdin is closed.
    pub async fn run(&mut self) -> Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serves the given stream pair until end of input, then tears the
    /// session down.
    pub async fn serve<R, W>(&mut self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = MessageReader::new(reader);
        let mut writer = MessageWriter::new(writer);
        info!("waiting for initialize");

        let outcome = 'session: loop {
            let line = match reader.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("end of input");
                    break 'session Ok(());
                }
                Err(e) => {
                    error!("failed to read from client: {}", e);
                    break 'session Err(e);
                }
            };

            for message in self.handle_line(&line) {
                if let Err(e) = writer.send(&message).await {
                    error!("failed to write message: {}", e);
                    break 'session Err(e);
                }
            }
        };

        self.state = ProtocolState::Terminated;
        info!(stats = %self.dispatcher.stats().to_json(), "session terminated");
        let teardown = self.dispatcher.session().shutdown();
        outcome.and(teardown)
    }

    /// Handles one raw input line and returns everything to write back.
    pub fn handle_line(&mut self, line: &str) -> Vec<OutgoingMessage> {
        if line.trim().is_empty() {
            return Vec::new();
        }
        match decode_message(line) {
            Ok(request) => self.handle_request(request),
            Err(err) => {
                warn!("rejected message: {}", err);
                vec![JsonRpcResponse::from_decode_error(&err).into()]
            }
        }
    }

    /// Handles one decoded message according to the current state.
    pub fn handle_request(&mut self, request: JsonRpcRequest) -> Vec<OutgoingMessage> {
        let id = request.response_id();
        let notification = request.is_notification();

        match (self.state, request.method.as_str()) {
            (ProtocolState::Terminated, _) => Vec::new(),
            (_, "ping") if notification => Vec::new(),
            (_, "ping") => vec![JsonRpcResponse::success(id, json!({})).into()],
            (ProtocolState::AwaitingInit, "initialize") if notification => {
                debug!("ignoring initialize sent as a notification");
                Vec::new()
            }
            (ProtocolState::AwaitingInit, "initialize") => {
                self.state = ProtocolState::Initialized;
                info!("handshake complete");
                vec![
                    JsonRpcResponse::success(id, initialize_result()).into(),
                    JsonRpcNotification::new("notifications/initialized", json!({})).into(),
                ]
            }
            (ProtocolState::Initialized, "initialize") if notification => Vec::new(),
            (ProtocolState::Initialized, "initialize") => {
                warn!("repeated initialize; answering without re-announcing");
                vec![JsonRpcResponse::success(id, initialize_result()).into()]
            }
            (ProtocolState::AwaitingInit, method) if notification => {
                debug!(method, "dropping notification before initialize");
                Vec::new()
            }
            (ProtocolState::AwaitingInit, method) => {
                warn!(method, "request before initialize");
                vec![JsonRpcResponse::error(
                    id,
                    ErrorCode::ServerNotInitialized,
                    "server not initialized".to_string(),
                )
                .into()]
            }
            (ProtocolState::Initialized, method)
                if notification && (method.starts_with("notifications/") || method == "initialized") =>
            {
                debug!(method, "client notification");
                Vec::new()
            }
            (ProtocolState::Initialized, _) => {
                let response = self.dispatcher.dispatch(&request);
                if notification {
                    Vec::new()
                } else {
                    vec![response.into()]
                }
            }
        }
    }
}
