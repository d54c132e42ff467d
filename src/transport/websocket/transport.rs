//! WebSocket transport for the dispatch channel

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::SinkExt;
use futures::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::{DispatchError, Result};
use crate::transport::{Transport, TransportEvent};
use crate::types::status::CloseCode;

use super::config::WebSocketConfig;

pub(super) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport
pub struct WebSocketTransport {
    pub(super) config: WebSocketConfig,
    pub(super) sink: Option<SplitSink<WsStream, Message>>,
    pub(super) stream: Option<SplitStream<WsStream>>,
    pub(super) ready: Arc<AtomicBool>,
    pub(super) reader_task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Create a transport with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WebSocketConfig::default())
    }

    /// Create a transport with explicit settings
    #[must_use]
    pub fn with_config(config: WebSocketConfig) -> Self {
        Self {
            config,
            sink: None,
            stream: None,
            ready: Arc::new(AtomicBool::new(false)),
            reader_task: None,
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WebSocketTransport {
    async fn connect(&mut self, url: &Url) -> Result<()> {
        self.connect_impl(url).await
    }

    async fn write(&mut self, data: &str) -> Result<()> {
        if !self.is_ready() {
            return Err(DispatchError::transport("Transport is not ready for writing"));
        }

        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| DispatchError::transport("socket not available"))?;

        sink.send(Message::Text(data.to_string()))
            .await
            .map_err(|e| DispatchError::transport(format!("Failed to write frame: {e}")))?;

        Ok(())
    }

    fn read_messages(&mut self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.read_messages_impl()
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn close(&mut self, code: CloseCode) -> Result<()> {
        self.close_impl(code).await
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.drop_impl();
    }
}
