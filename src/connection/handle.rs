//! Cloneable front end of the connection task

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use url::Url;

use super::commands::ConnectionCommand;
use super::{ConnectionEvent, UrlSource};
use crate::error::{DispatchError, Result};
use crate::protocol::OutboundMessage;
use crate::types::status::{CloseCode, ConnectionStatus};

/// Handle to the connection task
///
/// Cheap to clone; every clone drives the same channel.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub(super) command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    pub(super) status_rx: watch::Receiver<ConnectionStatus>,
    pub(super) events_tx: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionHandle {
    /// Open the channel to a fixed `url`; a no-op while connected
    ///
    /// A failed attempt still schedules a delayed reconnect.
    ///
    /// # Errors
    /// Returns the handshake error, or `TaskStopped` if the task is gone
    pub async fn connect(&self, url: Url) -> Result<()> {
        self.connect_with(Arc::new(move || Ok(url.clone()))).await
    }

    /// Open the channel to whatever URL `source` builds
    ///
    /// The source runs before every attempt, reconnects included, so it can
    /// pick up credentials refreshed while the channel was up.
    ///
    /// # Errors
    /// Same as [`Self::connect`], plus any error of `source`
    pub async fn connect_with(&self, source: UrlSource) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command(ConnectionCommand::Connect {
            source,
            response_tx,
        })?;
        response_rx
            .await
            .map_err(|_| DispatchError::task_stopped("connection"))?
    }

    /// Write a protocol message; `false` when it was dropped
    pub async fn send(&self, message: &OutboundMessage) -> bool {
        match message.to_json() {
            Ok(payload) => self.send_text(payload).await,
            Err(e) => {
                log::error!("Failed to encode {message:?}: {e}");
                false
            }
        }
    }

    /// Write a raw text frame; `false` when it was dropped
    pub async fn send_text(&self, payload: String) -> bool {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .command(ConnectionCommand::Send {
                payload,
                response_tx,
            })
            .is_err()
        {
            return false;
        }
        response_rx.await.unwrap_or(false)
    }

    /// Record the code for the next explicit disconnect
    pub fn set_close_code(&self, code: CloseCode) {
        let _ = self.command(ConnectionCommand::SetCloseCode { code });
    }

    /// Close the channel and stop reconnecting until the next `connect`
    ///
    /// # Errors
    /// Returns `TaskStopped` if the task is gone
    pub async fn disconnect(&self) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command(ConnectionCommand::Disconnect { response_tx })?;
        response_rx
            .await
            .map_err(|_| DispatchError::task_stopped("connection"))
    }

    /// Lower the handshake gate
    pub fn release_handshake(&self) {
        let _ = self.command(ConnectionCommand::ReleaseHandshake);
    }

    /// Current connection status
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Observable connection status
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Subscribe to lifecycle events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events_tx.subscribe()
    }

    /// Wait until a channel is open
    ///
    /// # Errors
    /// Returns `TaskStopped` if the task ends first
    pub async fn wait_connected(&self) -> Result<()> {
        let mut status_rx = self.status_rx.clone();
        status_rx
            .wait_for(ConnectionStatus::is_connected)
            .await
            .map(|_| ())
            .map_err(|_| DispatchError::task_stopped("connection"))
    }

    fn command(&self, cmd: ConnectionCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|_| DispatchError::task_stopped("connection"))
    }
}
