//! Guard status and intervention state machine
//!
//! The session task interprets inbound protocol frames and the guard's
//! intents, keeps the guard session and live report consistent, and persists
//! status changes. Decisions on a pushed report (accept/reject) are checked
//! against the server before the task applies them; the task re-validates
//! the report when the command arrives.
//!
//! While the guard is NOT_RESPONDING every status-changing intent except
//! [`SessionHandle::acknowledge_warning`] fails with
//! [`crate::DispatchError::AcknowledgementRequired`].
//!
//! # Module Structure
//!
//! - `handle` - Cloneable `SessionHandle` with the public intents
//! - `state` - Snapshot, events and intent outcomes
//! - `commands` - Command protocol for the session task
//! - `poll` - Liveness poll timer
//! - `background` - The session task itself

mod background;
mod commands;
mod handle;
mod poll;
mod state;

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::api::DispatchApi;
use crate::connection::ConnectionHandle;
use crate::store::CredentialStore;

use background::SessionTask;

pub use handle::SessionHandle;
pub use state::{IntentOutcome, SessionEvent, SessionSnapshot};

/// Capacity of the session event channel
const EVENT_CAPACITY: usize = 64;

/// Liveness poll settings
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Spacing between asks
    pub interval: Duration,
    /// Maximum asks per report
    pub attempts: u32,
}

/// Entry point for the session task
pub struct SessionStateMachine;

impl SessionStateMachine {
    /// Spawn the session task
    ///
    /// The initial session is loaded from `store`. Inbound frames are read
    /// from `inbound_rx`; outbound messages go through `connection`.
    pub fn spawn(
        store: Arc<dyn CredentialStore>,
        api: Arc<dyn DispatchApi>,
        connection: ConnectionHandle,
        inbound_rx: mpsc::UnboundedReceiver<serde_json::Value>,
        poll: PollSettings,
        shutdown: CancellationToken,
    ) -> SessionHandle {
        let session = store.load_session().unwrap_or_else(|e| {
            warn!("Starting without a persisted session: {e}");
            Default::default()
        });

        let snapshot = SessionSnapshot {
            session: session.clone(),
            report: None,
            intervention_pending: false,
        };
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let task = SessionTask {
            session,
            report: None,
            intervention_pending: false,
            store,
            connection,
            snapshot_tx,
            events_tx: events_tx.clone(),
            poll: None,
            poll_interval: poll.interval,
            poll_attempts: poll.attempts,
        };
        tokio::spawn(task.run(command_rx, inbound_rx, shutdown));

        SessionHandle {
            command_tx,
            snapshot_rx,
            events_tx,
            api,
        }
    }
}
