//! Frame reading logic for the WebSocket transport

use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::StreamExt;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::transport::TransportEvent;

use super::transport::WebSocketTransport;

impl WebSocketTransport {
    /// Read frames from the socket
    ///
    /// This method spawns a background task that parses text frames as JSON.
    /// Frames that are not JSON are logged and dropped.
    ///
    /// # Returns
    /// A receiver that yields transport events until the channel ends
    pub(super) fn read_messages_impl(&mut self) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        let stream = self.stream.take();
        let ready = Arc::clone(&self.ready);
        let max_message_size = self.config.max_message_size;

        let task = tokio::spawn(async move {
            let Some(mut stream) = stream else {
                let _ = tx.send(TransportEvent::Failed(
                    "Not connected - socket not available".to_string(),
                ));
                return;
            };

            let end = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > max_message_size {
                            warn!(
                                "Dropping {} byte frame (limit {max_message_size})",
                                text.len()
                            );
                            continue;
                        }
                        match serde_json::from_str::<serde_json::Value>(&text) {
                            Ok(value) => {
                                if tx.send(TransportEvent::Message(value)).is_err() {
                                    // Receiver dropped, stop reading
                                    return;
                                }
                            }
                            Err(e) => debug!("Ignoring non-JSON frame: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => TransportEvent::Closed {
                                code: Some(u16::from(frame.code)),
                                reason: frame.reason.into_owned(),
                            },
                            None => TransportEvent::Closed {
                                code: None,
                                reason: String::new(),
                            },
                        };
                    }
                    // Ping/pong are answered by tungstenite; binary is not part of the protocol
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break TransportEvent::Failed(e.to_string()),
                    None => {
                        break TransportEvent::Closed {
                            code: None,
                            reason: "stream ended".to_string(),
                        };
                    }
                }
            };

            ready.store(false, Ordering::SeqCst);
            let _ = tx.send(end);
        });

        self.reader_task = Some(task);

        rx
    }
}
