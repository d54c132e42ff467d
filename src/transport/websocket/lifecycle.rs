//! Lifecycle management for the WebSocket transport (connect, close)

use std::borrow::Cow;
use std::sync::atomic::Ordering;

use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use url::Url;

use crate::error::{DispatchError, Result};
use crate::types::status::CloseCode;

use super::transport::WebSocketTransport;

impl WebSocketTransport {
    /// Open the WebSocket
    ///
    /// # Errors
    /// Returns error if the handshake fails or times out
    pub(super) async fn connect_impl(&mut self, url: &Url) -> Result<()> {
        if self.is_ready_impl() {
            return Ok(());
        }

        // A reader left over from an ended channel would race the new one
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }

        let handshake = connect_async(url.as_str());
        let (ws_stream, response) = tokio::time::timeout(self.config.connect_timeout, handshake)
            .await
            .map_err(|_| {
                DispatchError::timeout(format!(
                    "WebSocket handshake exceeded {:?}",
                    self.config.connect_timeout
                ))
            })?
            .map_err(|e| DispatchError::connection(format!("Failed to open WebSocket: {e}")))?;

        debug!("WebSocket open (HTTP {})", response.status());

        let (sink, stream) = ws_stream.split();
        self.sink = Some(sink);
        self.stream = Some(stream);
        self.ready.store(true, Ordering::SeqCst);

        Ok(())
    }

    /// Send a close frame and release the socket
    ///
    /// # Errors
    /// Returns error if the close frame cannot be written
    pub(super) async fn close_impl(&mut self, code: CloseCode) -> Result<()> {
        self.ready.store(false, Ordering::SeqCst);

        // The reader would otherwise report our own close back as a peer close
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.stream = None;

        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };

        let frame = CloseFrame {
            code: code.get().into(),
            reason: Cow::Borrowed(""),
        };

        let sent = sink.send(Message::Close(Some(frame))).await;
        if let Err(e) = sink.close().await {
            debug!("WebSocket sink close: {e}");
        }

        sent.map_err(|e| {
            warn!("Failed to send close frame {code}: {e}");
            DispatchError::transport(format!("Failed to send close frame: {e}"))
        })
    }

    fn is_ready_impl(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && self.sink.is_some()
    }

    /// Handle Drop cleanup
    pub(super) fn drop_impl(&mut self) {
        self.ready.store(false, Ordering::SeqCst);

        if let Some(task) = self.reader_task.take() {
            task.abort();
        }

        // Dropping the halves closes the TCP stream without a close frame
        self.sink = None;
        self.stream = None;
    }
}
