//! Session task
//!
//! Owns the guard session and the live report. Inbound frames from the
//! connection and commands from [`super::SessionHandle`] are applied here, one
//! at a time.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::SessionEvent;
use super::commands::SessionCommand;
use super::poll::{ActivityPoll, ask_due};
use super::state::{IntentOutcome, SessionSnapshot};
use crate::connection::ConnectionHandle;
use crate::error::{DispatchError, Result};
use crate::message::parse_inbound;
use crate::protocol::{InboundMessage, InterventionAction, OutboundMessage};
use crate::store::CredentialStore;
use crate::types::identifiers::ReportId;
use crate::types::location::GeoPoint;
use crate::types::session::{
    ActiveIntervention, GuardSession, InterventionReport, LoginGrant, ReportLifecycle,
};
use crate::types::status::GuardStatus;

pub(super) struct SessionTask {
    pub session: GuardSession,
    pub report: Option<InterventionReport>,
    pub intervention_pending: bool,
    pub store: Arc<dyn CredentialStore>,
    pub connection: ConnectionHandle,
    pub snapshot_tx: watch::Sender<SessionSnapshot>,
    pub events_tx: broadcast::Sender<SessionEvent>,
    pub poll: Option<ActivityPoll>,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
}

impl SessionTask {
    pub(super) async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
        mut inbound_rx: mpsc::UnboundedReceiver<serde_json::Value>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("Session task shutting down");
                    break;
                }
                cmd = command_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle_command(cmd).await;
                }
                Some(frame) = inbound_rx.recv() => {
                    self.handle_frame(frame).await;
                }
                () = ask_due(&mut self.poll) => {
                    self.poll_tick().await;
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Begin { grant, response_tx } => {
                let _ = response_tx.send(self.begin(&grant));
            }
            SessionCommand::Clear { response_tx } => {
                let _ = response_tx.send(self.clear());
            }
            SessionCommand::Expire { response_tx } => {
                warn!("Session expired; a new login is required");
                let result = self.clear();
                let _ = self.events_tx.send(SessionEvent::ReauthenticationRequired);
                let _ = response_tx.send(result);
            }
            SessionCommand::UpdateTokens { tokens } => {
                self.session.apply_tokens(&tokens);
                self.publish();
            }
            SessionCommand::Decide {
                report_id,
                accept,
                response_tx,
            } => {
                let _ = response_tx.send(self.decide(report_id, accept).await);
            }
            SessionCommand::Act {
                action,
                response_tx,
            } => {
                let _ = response_tx.send(self.act(action).await);
            }
            SessionCommand::ChangeStatus {
                status,
                response_tx,
            } => {
                let result = match self.ensure_unlocked() {
                    Ok(()) => {
                        self.change_status(status, true).await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                let _ = response_tx.send(result);
            }
            SessionCommand::TogglePatrol { response_tx } => {
                let result = match self.ensure_unlocked() {
                    Ok(()) => {
                        let next = if self.session.status.is_patrol_active() {
                            GuardStatus::Unavailable
                        } else {
                            GuardStatus::Available
                        };
                        self.change_status(next, true).await;
                        Ok(next)
                    }
                    Err(e) => Err(e),
                };
                let _ = response_tx.send(result);
            }
            SessionCommand::AcknowledgeWarning { response_tx } => {
                if self.session.status == GuardStatus::NotResponding {
                    info!("Not-responding warning acknowledged");
                    self.change_status(GuardStatus::Unavailable, true).await;
                }
                let _ = response_tx.send(Ok(()));
            }
            SessionCommand::AdoptActive {
                active,
                response_tx,
            } => {
                self.adopt_active(active);
                let _ = response_tx.send(Ok(()));
            }
        }
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    async fn handle_frame(&mut self, frame: serde_json::Value) {
        let message = match parse_inbound(frame) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring inbound frame: {e}");
                return;
            }
        };

        match message {
            InboundMessage::Connected => {
                self.connection.release_handshake();
                let _ = self.events_tx.send(SessionEvent::ConnectionReady);
            }
            InboundMessage::Confirm {
                report_id,
                location,
            } => self.on_confirm(report_id, location).await,
            InboundMessage::Warning => self.on_warning(),
            InboundMessage::Cancel | InboundMessage::NotActive => self.on_cancel(),
            InboundMessage::Unknown => debug!("Ignoring frame with unknown status"),
        }
    }

    async fn on_confirm(&mut self, report_id: Option<ReportId>, location: Option<GeoPoint>) {
        let id = report_id.or(self.session.last_report_id);

        if let Some(existing) = self.report
            && existing.lifecycle.is_in_progress()
            && Some(existing.report_id) != id
        {
            warn!(
                "Ignoring confirm for {id:?} while report {} is in progress",
                existing.report_id
            );
            return;
        }

        if let Some(report_id) = report_id {
            self.set_last_report_id(Some(report_id));
        }

        if let Some(location) = location {
            match id {
                Some(id) => {
                    let report = self.replace_report(id, location);
                    self.intervention_pending =
                        report.lifecycle == ReportLifecycle::PendingConfirm;
                    if self.session.status == GuardStatus::NotResponding {
                        self.publish();
                    } else {
                        self.change_status(GuardStatus::Intervention, false).await;
                    }
                    let _ = self.events_tx.send(SessionEvent::InterventionPending(report));
                }
                None => warn!("Confirm with a location but no report id; ignoring location"),
            }
        } else {
            // Decision is still offered; the target is `last_report_id`
            if id.is_some() && !self.report.is_some_and(|r| r.lifecycle.is_in_progress()) {
                self.intervention_pending = true;
            }
            self.publish();
        }

        if let Some(id) = id {
            self.start_poll(id).await;
        }
    }

    /// Report for a pushed confirm; a repeat keeps its lifecycle, another id
    /// displaces the pending one
    fn replace_report(&mut self, id: ReportId, location: GeoPoint) -> InterventionReport {
        let report = match self.report {
            Some(existing) if existing.report_id == id => {
                debug!("Repeat confirm for {id} ({:?})", existing.lifecycle);
                InterventionReport {
                    location,
                    ..existing
                }
            }
            Some(existing) => {
                info!(
                    "Intervention {id} replaces pending report {}",
                    existing.report_id
                );
                let _ = self.events_tx.send(SessionEvent::ReportCleared {
                    report_id: existing.report_id,
                    lifecycle: ReportLifecycle::Cancelled,
                });
                InterventionReport::pending(id, location)
            }
            None => {
                info!("Intervention {id} pending confirmation");
                InterventionReport::pending(id, location)
            }
        };
        self.report = Some(report);
        report
    }

    fn on_warning(&mut self) {
        warn!("Server flagged the guard as not responding");
        self.intervention_pending = false;
        self.set_status_local(GuardStatus::NotResponding);
        let _ = self.events_tx.send(SessionEvent::AcknowledgementRequired);
    }

    fn on_cancel(&mut self) {
        let report_id = self.report.take().map(|report| report.report_id);
        info!("Intervention {report_id:?} cancelled by the server");
        self.intervention_pending = false;
        self.poll = None;

        if self.session.status == GuardStatus::Intervention {
            self.set_status_local(GuardStatus::Unavailable);
        } else {
            self.publish();
        }
        let _ = self
            .events_tx
            .send(SessionEvent::InterventionCancelled { report_id });
    }

    // ========================================================================
    // Activity poll
    // ========================================================================

    async fn start_poll(&mut self, report_id: ReportId) {
        self.poll = None;
        if self.poll_attempts == 0 {
            return;
        }
        self.connection
            .send(&OutboundMessage::ask_is_active(report_id))
            .await;
        self.poll = ActivityPoll::started(report_id, self.poll_attempts, self.poll_interval);
    }

    async fn poll_tick(&mut self) {
        let Some(report_id) = self.poll.as_ref().map(|poll| poll.report_id) else {
            return;
        };

        let still_live = match self.report {
            Some(report) => report.report_id == report_id,
            // Confirm without a location never creates a report
            None => self.session.last_report_id == Some(report_id),
        };
        if !still_live {
            self.poll = None;
            return;
        }

        self.connection
            .send(&OutboundMessage::ask_is_active(report_id))
            .await;
        if let Some(poll) = self.poll.as_mut()
            && !poll.record_ask()
        {
            debug!("Activity poll for {report_id} finished");
            self.poll = None;
        }
    }

    // ========================================================================
    // Intents
    // ========================================================================

    fn ensure_unlocked(&self) -> Result<()> {
        if self.session.status == GuardStatus::NotResponding {
            Err(DispatchError::AcknowledgementRequired)
        } else {
            Ok(())
        }
    }

    fn current_report_id(&self) -> Option<ReportId> {
        self.report
            .map(|report| report.report_id)
            .or(self.session.last_report_id)
    }

    async fn decide(&mut self, report_id: ReportId, accept: bool) -> Result<IntentOutcome> {
        self.ensure_unlocked()?;

        // The server check ran outside the task; the report may have moved on
        let still_current = match self.report {
            Some(report) => report.report_id == report_id,
            None => self.session.last_report_id == Some(report_id),
        };
        if !still_current {
            info!("Report {report_id} changed during the availability check");
            return Ok(IntentOutcome::Suppressed);
        }

        if accept {
            if let Some(report) = self.report.as_mut() {
                report.lifecycle = ReportLifecycle::Accepted;
            }
            self.intervention_pending = false;
            self.connection
                .send(&OutboundMessage::intervention(
                    report_id,
                    InterventionAction::Accept,
                ))
                .await;
            self.change_status(GuardStatus::Intervention, true).await;
            info!("Intervention {report_id} accepted");
        } else {
            self.clear_report(report_id, ReportLifecycle::Cancelled);
            self.connection
                .send(&OutboundMessage::intervention(
                    report_id,
                    InterventionAction::Cancel,
                ))
                .await;
            self.change_status(GuardStatus::Available, true).await;
            info!("Intervention {report_id} rejected");
        }
        Ok(IntentOutcome::Sent)
    }

    async fn act(&mut self, action: InterventionAction) -> Result<ReportId> {
        let finishes = matches!(
            action,
            InterventionAction::Finish | InterventionAction::CancelStarted
        );
        if finishes {
            self.ensure_unlocked()?;
        }
        let report_id = self.current_report_id().ok_or(DispatchError::NoLiveReport)?;

        match action {
            InterventionAction::ConfirmArrival => {
                if let Some(report) = self.report.as_mut() {
                    report.lifecycle = ReportLifecycle::Arrived;
                }
                self.publish();
            }
            InterventionAction::Finish => {
                self.clear_report(report_id, ReportLifecycle::Finished);
            }
            InterventionAction::CancelStarted => {
                self.clear_report(report_id, ReportLifecycle::Cancelled);
            }
            _ => {}
        }

        self.connection
            .send(&OutboundMessage::intervention(report_id, action))
            .await;

        if finishes {
            self.change_status(GuardStatus::Available, true).await;
        }
        debug!("Intervention {report_id}: {action:?}");
        Ok(report_id)
    }

    fn adopt_active(&mut self, active: Option<ActiveIntervention>) {
        let Some(active) = active else {
            if self.session.status.is_patrol_active() {
                info!("No active intervention; going off patrol");
                self.set_status_local(GuardStatus::Unavailable);
            }
            return;
        };

        if let Some(id) = active.report_id {
            self.set_last_report_id(Some(id));
        }
        match active.report_id.or(self.session.last_report_id) {
            Some(id) => {
                self.report = Some(InterventionReport {
                    report_id: id,
                    location: active.location,
                    lifecycle: ReportLifecycle::Accepted,
                });
                info!("Resumed intervention {id}");
            }
            None => warn!("Active intervention without a report id"),
        }
        self.intervention_pending = false;

        if self.session.status == GuardStatus::NotResponding {
            self.publish();
        } else {
            self.set_status_local(GuardStatus::Intervention);
        }
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    fn begin(&mut self, grant: &LoginGrant) -> Result<()> {
        self.session = GuardSession::from_grant(grant, GuardStatus::Unavailable);
        self.report = None;
        self.intervention_pending = false;
        self.poll = None;
        self.store.save_session(&self.session)?;
        info!("Session started for guard {}", grant.guard_id);
        self.publish();
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.session = GuardSession::default();
        self.report = None;
        self.intervention_pending = false;
        self.poll = None;
        self.publish();
        self.store.clear()?;
        info!("Session cleared");
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Drop the report that ended in `lifecycle`
    fn clear_report(&mut self, report_id: ReportId, lifecycle: ReportLifecycle) {
        self.report = None;
        self.intervention_pending = false;
        self.poll = None;
        let _ = self.events_tx.send(SessionEvent::ReportCleared {
            report_id,
            lifecycle,
        });
    }

    fn set_last_report_id(&mut self, report_id: Option<ReportId>) {
        self.session.last_report_id = report_id;
        if let Err(e) = self.store.set_last_report_id(report_id) {
            error!("Failed to persist last report id: {e}");
        }
    }

    /// Persist and broadcast a status without telling the server
    fn set_status_local(&mut self, status: GuardStatus) {
        let changed = self.session.status != status;
        self.session.status = status;
        if let Err(e) = self.store.set_status(status) {
            error!("Failed to persist status {status}: {e}");
        }
        self.publish();
        if changed {
            info!("Status -> {status}");
            let _ = self.events_tx.send(SessionEvent::StatusChanged(status));
        }
    }

    /// Persist, broadcast and optionally send `{guardId, status}`
    async fn change_status(&mut self, status: GuardStatus, send: bool) {
        self.set_status_local(status);
        if !send {
            return;
        }
        match self.session.guard_id {
            Some(guard_id) => {
                self.connection
                    .send(&OutboundMessage::status(guard_id, status))
                    .await;
            }
            None => debug!("No guard id; status {status} kept local"),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(SessionSnapshot {
            session: self.session.clone(),
            report: self.report,
            intervention_pending: self.intervention_pending,
        });
    }
}
