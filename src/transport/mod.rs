//! Transport layer for the dispatch channel
//!
//! This module provides the transport abstraction and the WebSocket
//! implementation used to talk to the dispatch server.

pub mod websocket;

use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;
use crate::types::status::CloseCode;

/// Something that happened on an open channel
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A JSON text frame from the server
    Message(serde_json::Value),
    /// The channel was closed by the peer or by us
    Closed {
        /// Close code, when the peer sent one
        code: Option<u16>,
        /// Close reason text
        reason: String,
    },
    /// The channel failed at the transport level
    Failed(String),
}

/// Transport trait for the duplex dispatch channel
///
/// A transport carries at most one open channel. `connect` after a channel
/// ended replaces it; the connection manager never calls `connect` while a
/// channel is open.
pub trait Transport: Send + Sync + 'static {
    /// Open a channel to `url`
    ///
    /// # Errors
    /// Returns error if the handshake fails
    fn connect(&mut self, url: &Url) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Write one text frame
    ///
    /// # Errors
    /// Returns error if the write fails or no channel is open
    fn write(&mut self, data: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Take the event stream of the current channel
    ///
    /// Spawns the reader for the channel opened by the last `connect`. The
    /// receiver ends after a `Closed` or `Failed` event.
    fn read_messages(&mut self) -> mpsc::UnboundedReceiver<TransportEvent>;

    /// Check if a channel is open for writing
    fn is_ready(&self) -> bool;

    /// Close the channel with `code`
    ///
    /// # Errors
    /// Returns error if the close frame cannot be sent
    fn close(&mut self, code: CloseCode) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub use websocket::{WebSocketConfig, WebSocketTransport};
