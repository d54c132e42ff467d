//! WebSocket transport implementation
//!
//! This module provides a transport implementation that opens a WebSocket to
//! the dispatch server and exchanges JSON text frames with it.

mod config;
mod lifecycle;
mod reader;
mod transport;

// Re-export public types
pub use config::WebSocketConfig;
pub use transport::WebSocketTransport;
