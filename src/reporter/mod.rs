//! Position reporting and the credential cadence
//!
//! The keep-running driver feeds [`LocationReporter`] one sample at start and
//! one per update interval. The reporter decides what, if anything, goes to
//! the server, and (in piggy-back mode) counts ticks towards the next
//! credential check.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::connection::ConnectionHandle;
use crate::credentials::{CredentialCheck, CredentialManager};
use crate::protocol::OutboundMessage;
use crate::session::SessionHandle;
use crate::types::location::{GeoPoint, LocationSample};
use crate::types::options::{EngineOptions, TokenCadence};

// ============================================================================
// Credential check
// ============================================================================

/// Single-flight credential check shared by the tick counter and the timer
#[derive(Clone)]
pub struct CredentialTask {
    credentials: Arc<CredentialManager>,
    connection: ConnectionHandle,
    session: SessionHandle,
    in_flight: Arc<AtomicBool>,
}

impl CredentialTask {
    /// Create a check over the given components
    pub fn new(
        credentials: Arc<CredentialManager>,
        connection: ConnectionHandle,
        session: SessionHandle,
    ) -> Self {
        Self {
            credentials,
            connection,
            session,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a check is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Start a check in the background; `None` if one is already running
    pub fn spawn(&self) -> Option<JoinHandle<CredentialCheck>> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("Credential check already running");
            return None;
        }
        let task = self.clone();
        Some(tokio::spawn(async move {
            let outcome = task.run().await;
            task.in_flight.store(false, Ordering::SeqCst);
            outcome
        }))
    }

    /// Run one check inline
    ///
    /// An expired refresh token disconnects the channel and clears the
    /// session; refreshed tokens are forwarded to the session.
    pub async fn run(&self) -> CredentialCheck {
        let outcome = self.credentials.check().await;
        match outcome {
            CredentialCheck::SessionExpired => {
                warn!("Session expired; disconnecting");
                if let Err(e) = self.connection.disconnect().await {
                    warn!("Disconnect after session expiry failed: {e}");
                }
                if let Err(e) = self.session.expire().await {
                    warn!("Clearing the expired session failed: {e}");
                }
            }
            CredentialCheck::Refreshed(ref tokens) => {
                self.session.update_tokens(tokens.clone());
            }
            CredentialCheck::NoAction => {}
        }
        outcome
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// What a sample produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    /// Init message (start, or the handshake gate was raised)
    Init,
    /// Periodic position message
    Position,
    /// Below the displacement threshold
    Skipped,
    /// A message was built but the connection dropped it
    Dropped,
}

/// Result of one tick
#[derive(Debug)]
pub struct TickOutcome {
    /// What was sent
    pub report: Report,
    /// Credential check started by this tick, if any
    pub credential_check: Option<JoinHandle<CredentialCheck>>,
}

/// Turns location samples into protocol messages
pub struct LocationReporter {
    connection: ConnectionHandle,
    session: SessionHandle,
    credentials: CredentialTask,
    min_displacement_m: f64,
    cadence: TokenCadence,
    token_check_interval: u32,
    ticks: u32,
    last_reported: Option<GeoPoint>,
}

impl LocationReporter {
    /// Create a reporter configured from `options`
    pub fn new(
        options: &EngineOptions,
        connection: ConnectionHandle,
        session: SessionHandle,
        credentials: CredentialTask,
    ) -> Self {
        Self {
            connection,
            session,
            credentials,
            min_displacement_m: options.min_displacement_m,
            cadence: options.token_cadence,
            token_check_interval: options.token_check_interval(),
            ticks: 0,
            last_reported: None,
        }
    }

    /// Last position the server acknowledged receiving
    #[must_use]
    pub const fn last_reported(&self) -> Option<GeoPoint> {
        self.last_reported
    }

    /// Ticks counted towards the next piggy-backed credential check
    #[must_use]
    pub const fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Send the init message for the first sample
    pub async fn on_start(&mut self, sample: LocationSample) -> Report {
        self.ticks = 0;
        self.last_reported = Some(sample.point);
        let report = self.send(sample.point, true).await;
        info!(
            "Reporting started at ({:.5}, {:.5})",
            sample.latitude(),
            sample.longitude()
        );
        report
    }

    /// Handle one periodic sample
    pub async fn on_tick(&mut self, sample: LocationSample) -> TickOutcome {
        let mut credential_check = None;
        if self.cadence == TokenCadence::PiggyBack {
            self.ticks += 1;
            if self.ticks >= self.token_check_interval {
                self.ticks = 0;
                credential_check = self.credentials.spawn();
            }
        }

        let moved = self
            .last_reported
            .is_none_or(|last| last.distance_to(&sample.point) >= self.min_displacement_m);

        let report = if self.connection.status().handshake_pending {
            self.send(sample.point, true).await
        } else if moved {
            self.send(sample.point, false).await
        } else {
            Report::Skipped
        };

        if matches!(report, Report::Init | Report::Position) {
            self.last_reported = Some(sample.point);
        }

        TickOutcome {
            report,
            credential_check,
        }
    }

    async fn send(&self, point: GeoPoint, init: bool) -> Report {
        let snapshot = self.session.snapshot();
        let Some(guard_id) = snapshot.session.guard_id else {
            debug!("No guard session; position not sent");
            return Report::Dropped;
        };
        let status = snapshot.status();

        let (message, report) = if init {
            (OutboundMessage::init(guard_id, status, point), Report::Init)
        } else {
            (
                OutboundMessage::position(guard_id, status, point),
                Report::Position,
            )
        };

        if self.connection.send(&message).await {
            report
        } else {
            Report::Dropped
        }
    }
}
