pub mod config;
pub mod errors;
pub mod mcp;
pub mod session;
pub mod settings;
pub mod shutdown;
pub mod types;
pub mod watcher;
