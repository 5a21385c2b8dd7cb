use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while serving protocol traffic or running a capability.
#[derive(Error, Debug)]
pub enum CodeIndexError {
    #[error("parse error: {message}")]
    MalformedMessage { message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String, id: Option<Value> },

    #[error("unknown capability: {name}")]
    UnknownCapability { name: String },

    #[error("capability already registered: {name}")]
    DuplicateCapability { name: String },

    #[error("capability '{name}' overlaps with registered capability '{existing}'")]
    AmbiguousCapability { name: String, existing: String },

    #[error("invalid params: {message}")]
    InvalidParams { message: String },

    #[error("project path not set; call set_project_path first")]
    ProjectNotSet,

    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("path is outside the project root: {path}")]
    PathOutsideRoot { path: String },

    #[error("file is not valid UTF-8: {path}")]
    NotUtf8 { path: String },

    #[error("handler for {capability} panicked")]
    HandlerPanicked { capability: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodeIndexError {
    /// Returns the JSON-RPC error code reported to clients for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::MalformedMessage { .. } => -32700,
            Self::InvalidRequest { .. } => -32600,
            Self::UnknownCapability { .. } => -32601,
            Self::InvalidParams { .. } => -32602,
            Self::ProjectNotSet
            | Self::NotADirectory { .. }
            | Self::FileNotFound { .. }
            | Self::PathOutsideRoot { .. }
            | Self::NotUtf8 { .. } => -32000,
            _ => -32603,
        }
    }

    /// Returns `true` for failures whose `Display` text is safe to send to a client.
    pub fn is_client_safe(&self) -> bool {
        !matches!(
            self,
            Self::Io(_)
                | Self::Json(_)
                | Self::Watcher(_)
                | Self::Config { .. }
                | Self::HandlerPanicked { .. }
                | Self::DuplicateCapability { .. }
                | Self::AmbiguousCapability { .. }
        )
    }

    /// Shorthand for an `InvalidParams` error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }
}

/// Convenience alias for results using `CodeIndexError`.
pub type Result<T> = std::result::Result<T, CodeIndexError>;
