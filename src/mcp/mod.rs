//! MCP (Model Context Protocol) server for the code index.
//!
//! Provides a JSON-RPC 2.0 interface over stdio, plus a stateless HTTP
//! bridge, both routing into one capability registry and one session.

/// Newline-delimited message codec.
pub mod codec;

/// Request routing and handler invocation.
pub mod dispatcher;

/// HTTP bridge.
pub mod http;

/// Capability registry and URI templates.
pub mod registry;

/// Resource handlers.
pub mod resources;

/// Stdio protocol state machine.
pub mod server;

/// Tool handlers.
pub mod tools;

/// JSON-RPC 2.0 transport types.
pub mod transport;

pub use dispatcher::Dispatcher;
pub use registry::{Capability, CapabilityRegistry};
pub use server::{McpServer, ProtocolState};
pub use transport::{ErrorCode, JsonRpcError, JsonRpcRequest, JsonRpcResponse};

use crate::errors::Result;

/// Builds the registry with every resource and tool this server exposes.
pub fn build_registry() -> Result<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    resources::register(&mut registry)?;
    tools::register(&mut registry)?;
    Ok(registry)
}
