//! Duplex channel management
//!
//! The connection task keeps at most one open channel to the dispatch server
//! and hides reconnect churn from the rest of the engine:
//!
//! - an unexpected close schedules one reconnect after a fixed delay and
//!   raises the handshake gate;
//! - an explicit `disconnect` closes with the pending close code (1000 when
//!   none was set) and suppresses reconnects until the next `connect`;
//! - sends while not connected are dropped, including while a handshake is
//!   still running;
//! - the channel URL is rebuilt for every attempt.
//!
//! # Module Structure
//!
//! - `handle` - Cloneable `ConnectionHandle` used by the other components
//! - `commands` - Command protocol for the connection task
//! - `background` - The connection task itself

mod background;
mod commands;
mod handle;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::transport::Transport;
use crate::types::status::{CloseCode, ConnectionStatus};

use background::ConnectionTask;

pub use handle::ConnectionHandle;

/// Builds the channel URL for the next connect attempt
pub type UrlSource = Arc<dyn Fn() -> Result<url::Url> + Send + Sync>;

/// Capacity of the lifecycle event channel
const EVENT_CAPACITY: usize = 64;

/// Channel lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A channel opened
    Opened,
    /// The open channel ended without an explicit disconnect
    Closed {
        /// Close code, when the peer sent one
        code: Option<u16>,
        /// Close reason or failure text
        reason: String,
    },
    /// A reconnect will be attempted after `delay`
    ReconnectScheduled {
        /// Wait before the attempt
        delay: Duration,
    },
    /// Explicit disconnect finished
    Disconnected {
        /// Code used on the wire
        code: CloseCode,
    },
}

/// Entry point for the connection task
pub struct ConnectionManager;

impl ConnectionManager {
    /// Spawn the connection task around `transport`
    ///
    /// Inbound JSON frames are forwarded to `inbound_tx`. The task ends when
    /// `shutdown` is cancelled or every handle is dropped, disconnecting first.
    pub fn spawn<T: Transport>(
        transport: T,
        reconnect_delay: Duration,
        inbound_tx: mpsc::UnboundedSender<serde_json::Value>,
        shutdown: CancellationToken,
    ) -> ConnectionHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let task = ConnectionTask {
            transport: Some(transport),
            reconnect_delay,
            url_source: None,
            status: ConnectionStatus::default(),
            status_tx,
            events_tx: events_tx.clone(),
            inbound_tx,
            channel_rx: None,
            reconnect: None,
            handshake: None,
            stopping: false,
        };
        tokio::spawn(task.run(command_rx, shutdown));

        ConnectionHandle {
            command_tx,
            status_rx,
            events_tx,
        }
    }
}
