//! Configuration constants and types for the WebSocket transport

use std::time::Duration;

/// Default maximum size of one inbound text frame (1MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Default time allowed for the opening handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// WebSocket transport settings
#[derive(Debug, Clone, Copy)]
pub struct WebSocketConfig {
    /// Handshake timeout
    pub connect_timeout: Duration,
    /// Inbound frames larger than this are dropped
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}
