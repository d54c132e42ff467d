//! Connection task
//!
//! Owns the transport and the connection state. Everything else talks to it
//! through [`super::ConnectionHandle`].
//!
//! The handshake runs as a future polled by the task loop, not inline, so
//! commands keep flowing while a connect is pending. The transport moves into
//! that future and comes back with its result.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::commands::ConnectionCommand;
use super::{ConnectionEvent, UrlSource};
use crate::error::{DispatchError, Result};
use crate::transport::{Transport, TransportEvent};
use crate::types::status::{ConnectionState, ConnectionStatus};

type HandshakeFuture<T> = Pin<Box<dyn Future<Output = (T, Result<()>)> + Send>>;

/// Connect attempt in flight
pub(super) struct Handshake<T> {
    future: HandshakeFuture<T>,
    url: Url,
    cancel: CancellationToken,
    waiters: Vec<oneshot::Sender<Result<()>>>,
}

pub(super) struct ConnectionTask<T: Transport> {
    /// `None` while a handshake owns it
    pub transport: Option<T>,
    pub reconnect_delay: Duration,
    pub url_source: Option<UrlSource>,
    pub status: ConnectionStatus,
    pub status_tx: watch::Sender<ConnectionStatus>,
    pub events_tx: broadcast::Sender<ConnectionEvent>,
    pub inbound_tx: mpsc::UnboundedSender<serde_json::Value>,
    pub channel_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    pub reconnect: Option<Pin<Box<Sleep>>>,
    pub handshake: Option<Handshake<T>>,
    /// Set by an explicit disconnect; suppresses reconnects until the next connect
    pub stopping: bool,
}

impl<T: Transport> ConnectionTask<T> {
    pub(super) async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("Connection task shutting down");
                    self.disconnect().await;
                    break;
                }
                cmd = command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        self.disconnect().await;
                        break;
                    };
                    self.handle_command(cmd).await;
                }
                (transport, result) = handshake_done(&mut self.handshake) => {
                    self.finish_handshake(transport, result);
                }
                event = next_event(&mut self.channel_rx) => {
                    let event = event.unwrap_or_else(|| TransportEvent::Closed {
                        code: None,
                        reason: "reader ended".to_string(),
                    });
                    self.handle_transport_event(event);
                }
                () = reconnect_due(&mut self.reconnect) => {
                    self.reconnect = None;
                    self.fire_reconnect();
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: ConnectionCommand) {
        match cmd {
            ConnectionCommand::Connect {
                source,
                response_tx,
            } => self.connect(source, response_tx),
            ConnectionCommand::Send {
                payload,
                response_tx,
            } => {
                let sent = self.send(&payload).await;
                let _ = response_tx.send(sent);
            }
            ConnectionCommand::SetCloseCode { code } => {
                self.status.close_code = Some(code);
                self.publish();
            }
            ConnectionCommand::Disconnect { response_tx } => {
                self.disconnect().await;
                let _ = response_tx.send(());
            }
            ConnectionCommand::ReleaseHandshake => {
                if self.status.handshake_pending {
                    debug!("Handshake released");
                    self.status.handshake_pending = false;
                    self.publish();
                }
            }
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn connect(&mut self, source: UrlSource, response_tx: oneshot::Sender<Result<()>>) {
        if self.status.state == ConnectionState::Connected {
            let _ = response_tx.send(Ok(()));
            return;
        }

        self.stopping = false;
        self.reconnect = None;
        self.url_source = Some(source);

        match self.handshake.as_mut() {
            // Joins the attempt already running
            Some(handshake) => handshake.waiters.push(response_tx),
            None => self.open(Some(response_tx)),
        }
    }

    async fn send(&mut self, payload: &str) -> bool {
        if self.status.state != ConnectionState::Connected {
            debug!("Dropping frame while {:?}", self.status.state);
            return false;
        }
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        match transport.write(payload).await {
            Ok(()) => {
                debug!("-> {payload}");
                true
            }
            Err(e) => {
                warn!("Failed to write frame: {e}");
                false
            }
        }
    }

    async fn disconnect(&mut self) {
        self.stopping = true;
        self.reconnect = None;

        if let Some(handshake) = self.handshake.take() {
            debug!("Cancelling handshake with {}", redacted(&handshake.url));
            handshake.cancel.cancel();
            let (transport, result) = handshake.future.await;
            if result.is_ok() {
                self.channel_rx = Some(self.transport_ready(transport));
            } else {
                self.transport = Some(transport);
            }
            for waiter in handshake.waiters {
                let _ = waiter.send(Err(DispatchError::connection(
                    "disconnected during handshake",
                )));
            }
        }

        let code = self.status.close_code.take().unwrap_or_default();
        if let Some(transport) = self.transport.as_mut()
            && (self.channel_rx.take().is_some() || transport.is_ready())
        {
            if let Err(e) = transport.close(code).await {
                warn!("Close with code {code} failed: {e}");
            }
            info!("Disconnected with code {code}");
        }

        self.status.state = ConnectionState::Disconnected;
        self.status.handshake_pending = false;
        self.publish();
        let _ = self.events_tx.send(ConnectionEvent::Disconnected { code });
    }

    // ========================================================================
    // Channel lifecycle
    // ========================================================================

    /// Start a handshake against a freshly built URL
    fn open(&mut self, waiter: Option<oneshot::Sender<Result<()>>>) {
        let url = match self.url_source.as_ref().map(|source| source()) {
            Some(Ok(url)) => url,
            Some(Err(e)) => {
                warn!("Cannot build the channel URL: {e}");
                self.schedule_reconnect();
                reply(waiter, Err(e));
                return;
            }
            None => {
                reply(waiter, Err(DispatchError::connection("no endpoint configured")));
                return;
            }
        };
        let Some(mut transport) = self.transport.take() else {
            reply(waiter, Err(DispatchError::connection("handshake already running")));
            return;
        };

        self.status.state = ConnectionState::Connecting;
        self.publish();
        debug!("Connecting to {}", redacted(&url));

        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();
        let target = url.clone();
        let future = Box::pin(async move {
            let result = tokio::select! {
                result = transport.connect(&target) => result,
                () = cancelled.cancelled() => Err(DispatchError::connection("handshake cancelled")),
            };
            (transport, result)
        });

        self.handshake = Some(Handshake {
            future,
            url,
            cancel,
            waiters: waiter.into_iter().collect(),
        });
    }

    fn finish_handshake(&mut self, transport: T, result: Result<()>) {
        let Some(handshake) = self.handshake.take() else {
            self.transport = Some(transport);
            return;
        };

        match result {
            Ok(()) => {
                self.channel_rx = Some(self.transport_ready(transport));
                self.status.state = ConnectionState::Connected;
                self.status.close_code = None;
                self.stopping = false;
                self.publish();
                info!("Connected to {}", redacted(&handshake.url));
                let _ = self.events_tx.send(ConnectionEvent::Opened);
                for waiter in handshake.waiters {
                    let _ = waiter.send(Ok(()));
                }
            }
            Err(e) => {
                self.transport = Some(transport);
                warn!("Failed to connect to {}: {e}", redacted(&handshake.url));
                self.schedule_reconnect();
                let mut waiters = handshake.waiters.into_iter();
                if let Some(first) = waiters.next() {
                    for waiter in waiters {
                        let _ = waiter.send(Err(DispatchError::connection(e.to_string())));
                    }
                    let _ = first.send(Err(e));
                }
            }
        }
    }

    /// Put the transport back and take the new channel's event stream
    fn transport_ready(&mut self, mut transport: T) -> mpsc::UnboundedReceiver<TransportEvent> {
        let events = transport.read_messages();
        self.transport = Some(transport);
        events
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message(value) => {
                debug!("<- {value}");
                if self.inbound_tx.send(value).is_err() {
                    debug!("Inbound consumer gone; dropping frame");
                }
            }
            TransportEvent::Closed { code, reason } => {
                info!("Channel closed (code {code:?}, reason {reason:?})");
                self.channel_ended(code, reason);
            }
            TransportEvent::Failed(reason) => {
                warn!("Channel failed: {reason}");
                self.channel_ended(None, reason);
            }
        }
    }

    fn channel_ended(&mut self, code: Option<u16>, reason: String) {
        self.channel_rx = None;
        let _ = self
            .events_tx
            .send(ConnectionEvent::Closed { code, reason });

        if self.stopping {
            self.status.state = ConnectionState::Disconnected;
            self.publish();
        } else {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.stopping {
            self.status.state = ConnectionState::Disconnected;
            self.publish();
            return;
        }

        self.status.state = ConnectionState::Connecting;
        self.status.handshake_pending = true;
        self.reconnect = Some(Box::pin(tokio::time::sleep(self.reconnect_delay)));
        self.publish();
        info!("Reconnecting in {:?}", self.reconnect_delay);
        let _ = self.events_tx.send(ConnectionEvent::ReconnectScheduled {
            delay: self.reconnect_delay,
        });
    }

    fn fire_reconnect(&mut self) {
        if self.stopping || self.handshake.is_some() {
            return;
        }
        // A failed attempt schedules the next one
        self.open(None);
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status);
    }
}

fn reply(waiter: Option<oneshot::Sender<Result<()>>>, result: Result<()>) {
    if let Some(waiter) = waiter {
        let _ = waiter.send(result);
    }
}

async fn handshake_done<T>(handshake: &mut Option<Handshake<T>>) -> (T, Result<()>) {
    match handshake {
        Some(handshake) => handshake.future.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_event(
    rx: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Endpoint without its query string, which may carry the access token
fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
